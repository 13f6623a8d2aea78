//! Gemini API collaborators: daily readings text and multi-speaker TTS.
//!
//! Both calls go to `models/{model}:generateContent`. The readings call
//! asks for JSON constrained by a response schema; the TTS call asks for
//! an AUDIO modality and returns base64 PCM in `inlineData.data`.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GeminiConfig;
use crate::model::LiturgicalDay;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no Gemini API key configured (set GEMINI_API_KEY or gemini.api_key)")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Gemini returned no text candidate")]
    EmptyResponse,
    #[error("response does not match the readings schema: {0}")]
    Json(#[from] serde_json::Error),
}

/// A speaker label in the script bound to a prebuilt voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceBinding {
    pub speaker: String,
    pub voice: String,
}

/// Source of the readings for a calendar date.
pub trait ReadingsSource: Send + Sync {
    fn fetch(&self, date: NaiveDate) -> impl Future<Output = Result<LiturgicalDay, FetchError>> + Send;
}

/// Multi-voice speech generator.
///
/// Returns base64 PCM (24kHz, mono, 16-bit) or `None` when no audio could
/// be produced. Absence is not an error for callers.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        script: &str,
        voices: &[VoiceBinding],
    ) -> impl Future<Output = Option<String>> + Send;
}

const READINGS_PROMPT: &str = r#"Genera las lecturas litúrgicas y el texto bíblico completo para la fecha {date}.
Debes seguir ESTRICTAMENTE el Ordo Litúrgico Católico Romano aprobado para Colombia por la Conferencia Episcopal de Colombia (CEC). Ignora cualquier otra variación regional.

Instrucciones:
1. Para la fecha {date}, determina el Tiempo Litúrgico, el tipo de celebración (Solemnidad, Fiesta, Memoria, Feria), y los ciclos bíblicos correspondientes (Ciclo Dominical A, B, o C; Ciclo Ferial I o II) que se usan en Colombia.
2. Para cada lectura (Primera Lectura, Salmo Responsorial, Segunda Lectura, Evangelio), proporciona un objeto con la 'cita' y el 'texto' completo.
3. El texto bíblico debe ser de una versión aprobada para la liturgia en Colombia (ej. la versión oficial de la Conferencia Episcopal de Colombia, si está disponible, o una traducción de uso común como la Biblia de Jerusalén).
4. Para el Salmo Responsorial, formatea el texto con saltos de línea para la antífona (R.) y las estrofas.
5. La Segunda Lectura solo se incluye los domingos y solemnidades. Para otros días, el campo 'segundaLectura' debe ser nulo."#;

const SPEECH_PROMPT: &str =
    "Lee el siguiente texto. La voz del \"{narrator}\" debe ser tranquila y emocional. La voz del \"{gospel}\" debe ser solemne y clara.\n\n{script}";

fn reading_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "cita": { "type": "STRING", "description": "Cita bíblica completa. Ej: Isaías 2, 1-5" },
            "texto": { "type": "STRING", "description": "El texto bíblico completo correspondiente a la cita." }
        },
        "required": ["cita", "texto"]
    })
}

fn readings_schema() -> Value {
    let mut second = reading_schema();
    second["nullable"] = json!(true);
    second["description"] = json!("Lectura completa. Nulo si no aplica.");

    json!({
        "type": "OBJECT",
        "properties": {
            "fecha": { "type": "STRING", "description": "La fecha para la cual se generaron las lecturas, en formato YYYY-MM-DD." },
            "diaLiturgico": { "type": "STRING", "description": "Ej: I Domingo de Adviento, Miércoles de la V Semana de Pascua" },
            "tiempoLiturgico": {
                "type": "STRING",
                "enum": ["Adviento", "Navidad", "Cuaresma", "Triduo Pascual", "Pascua", "T. Ordinario"]
            },
            "cicloDominical": { "type": "STRING", "nullable": true, "enum": ["A", "B", "C"], "description": "Nulo para ferias." },
            "cicloFerial": { "type": "STRING", "nullable": true, "enum": ["I", "II"], "description": "Nulo para domingos/solemnidades." },
            "tipoCelebracion": {
                "type": "STRING",
                "enum": ["Solemnidad", "Fiesta", "Memoria Obligatoria", "Memoria Libre", "Feria"]
            },
            "primeraLectura": reading_schema(),
            "salmoResponsorial": reading_schema(),
            "segundaLectura": second,
            "evangelio": reading_schema()
        },
        "required": ["fecha", "diaLiturgico", "tiempoLiturgico", "tipoCelebracion", "primeraLectura", "salmoResponsorial", "evangelio"]
    })
}

/// Pull `candidates[0].content.parts[0].text` out of a response.
fn candidate_text(data: &Value) -> Option<&str> {
    data["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .filter(|t| !t.trim().is_empty())
}

/// Pull the first inline audio payload out of a response.
fn candidate_audio(data: &Value) -> Option<&str> {
    data["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .find_map(|part| part["inlineData"]["data"].as_str())
        .filter(|d| !d.is_empty())
}

/// Parse the readings JSON returned by the model.
///
/// Only the shape is checked. Empty texts are kept; script assembly skips them.
pub fn parse_readings(text: &str) -> Result<LiturgicalDay, FetchError> {
    // Some models wrap JSON in a markdown fence even in JSON mode.
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    Ok(serde_json::from_str(trimmed)?)
}

#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    api_key: String,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, FetchError> {
        let api_key = config.resolve_api_key().ok_or(FetchError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    async fn generate(&self, model: &str, body: &Value) -> Result<Value, FetchError> {
        let url = format!(
            "{}/v1beta/models/{model}:generateContent",
            self.config.host.trim_end_matches('/')
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<Value>().await?)
    }
}

impl ReadingsSource for GeminiClient {
    async fn fetch(&self, date: NaiveDate) -> Result<LiturgicalDay, FetchError> {
        let t0 = Instant::now();
        let iso = date.format("%Y-%m-%d").to_string();
        let prompt = READINGS_PROMPT.replace("{date}", &iso);

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": readings_schema(),
                "temperature": self.config.temperature
            }
        });

        debug!("Requesting readings for {iso} from '{}'", self.config.text_model);
        let data = self.generate(&self.config.text_model, &body).await?;
        let text = candidate_text(&data).ok_or(FetchError::EmptyResponse)?;
        let day = parse_readings(text)?;

        if day.date != date {
            warn!("Requested readings for {iso}, model answered for {}", day.date);
        }
        info!(
            "Readings for {iso} fetched in {:.0}ms: {}",
            t0.elapsed().as_secs_f64() * 1000.0,
            day.label
        );
        Ok(day)
    }
}

impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, script: &str, voices: &[VoiceBinding]) -> Option<String> {
        let t0 = Instant::now();
        let prompt = speech_prompt(script, voices);

        let speaker_configs: Vec<Value> = voices
            .iter()
            .map(|b| {
                json!({
                    "speaker": b.speaker,
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": b.voice } }
                })
            })
            .collect();

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "multiSpeakerVoiceConfig": { "speakerVoiceConfigs": speaker_configs }
                }
            }
        });

        debug!(
            "Requesting speech for {} chars from '{}'",
            script.len(),
            self.config.tts_model
        );

        match self.generate(&self.config.tts_model, &body).await {
            Ok(data) => match candidate_audio(&data) {
                Some(audio) => {
                    info!(
                        "Speech generated in {:.0}ms ({} base64 chars)",
                        t0.elapsed().as_secs_f64() * 1000.0,
                        audio.len()
                    );
                    Some(audio.to_string())
                }
                None => {
                    warn!("Gemini TTS response carried no audio");
                    None
                }
            },
            Err(FetchError::Http(e)) if e.is_timeout() => {
                warn!("Gemini TTS request timed out");
                None
            }
            Err(e) => {
                warn!("Gemini TTS request failed: {e}");
                None
            }
        }
    }
}

fn speech_prompt(script: &str, voices: &[VoiceBinding]) -> String {
    let label = |i: usize| voices.get(i).map(|b| b.speaker.as_str()).unwrap_or_default();
    SPEECH_PROMPT
        .replace("{narrator}", label(0))
        .replace("{gospel}", label(1))
        .replace("{script}", script)
}
