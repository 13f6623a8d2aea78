//! Local playback of narration clips through rodio.

use std::io::Cursor;

use rodio::{Decoder, OutputStreamBuilder, Sink};
use tracing::info;

/// Play a WAV buffer on the default output device, blocking until it ends.
/// This is blocking and should be called in spawn_blocking.
pub fn play_wav_sync(wav: Vec<u8>) -> Result<(), String> {
    let mut stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| format!("Failed to open audio output: {e}"))?;
    stream.log_on_drop(false);

    let source = Decoder::new(Cursor::new(wav)).map_err(|e| format!("Failed to decode WAV: {e}"))?;

    // rodio 0.21: Sink::connect_new takes &Mixer
    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    info!("Playing narration");
    sink.sleep_until_end();
    Ok(())
}

pub async fn play_wav(wav: Vec<u8>) -> Result<(), String> {
    tokio::task::spawn_blocking(move || play_wav_sync(wav))
        .await
        .map_err(|e| format!("Playback task failed: {e}"))?
}
