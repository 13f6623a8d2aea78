//! Two-voice narration script for the TTS model.
//!
//! The narrator introduces the day and reads everything except the
//! Gospel, which goes to a separate reader. Speaker labels must match the
//! voice bindings sent with the synthesis request.

use crate::config::VoicesConfig;
use crate::model::{LiturgicalDay, Reading};

/// Response marker used in psalm texts; read aloud it sounds like a letter.
const RESPONSE_MARKER: &str = "R.";
const RESPONSE_SPOKEN: &str = "Respuesta:";

/// Build the full multi-speaker script for a day.
pub fn build_script(day: &LiturgicalDay, voices: &VoicesConfig) -> String {
    let mut script = format!(
        "{}: Lecturas para {}.\n\n",
        voices.narrator_speaker, day.label
    );

    for (title, reading) in day.readings() {
        let speaker = if title == "Evangelio" {
            &voices.gospel_speaker
        } else {
            &voices.narrator_speaker
        };
        script.push_str(&reading_block(speaker, title, reading));
    }

    script
}

/// One attributed block, or an empty string for a reading without text.
fn reading_block(speaker: &str, title: &str, reading: &Reading) -> String {
    if reading.is_empty() {
        return String::new();
    }
    let text = reading.text.replace(RESPONSE_MARKER, RESPONSE_SPOKEN);
    format!("{speaker}: {title}. Cita: {}. {text}\n\n", reading.citation)
}
