//! Liturgical day data model.
//!
//! Field names on the wire follow the Spanish JSON schema requested from
//! Gemini (`fecha`, `diaLiturgico`, ...). Closed sets are enums so a
//! malformed response fails at deserialization rather than downstream.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::AudioHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiturgicalSeason {
    #[serde(rename = "Adviento")]
    Advent,
    #[serde(rename = "Navidad")]
    Christmas,
    #[serde(rename = "Cuaresma")]
    Lent,
    #[serde(rename = "Triduo Pascual")]
    PaschalTriduum,
    #[serde(rename = "Pascua")]
    Easter,
    #[serde(rename = "T. Ordinario", alias = "Tiempo Ordinario")]
    Ordinary,
}

impl LiturgicalSeason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Advent => "Adviento",
            Self::Christmas => "Navidad",
            Self::Lent => "Cuaresma",
            Self::PaschalTriduum => "Triduo Pascual",
            Self::Easter => "Pascua",
            Self::Ordinary => "Tiempo Ordinario",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SundayCycle {
    A,
    B,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeekdayCycle {
    I,
    II,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CelebrationType {
    #[serde(rename = "Solemnidad")]
    Solemnity,
    #[serde(rename = "Fiesta")]
    Feast,
    #[serde(rename = "Memoria Obligatoria")]
    ObligatoryMemorial,
    #[serde(rename = "Memoria Libre")]
    OptionalMemorial,
    #[serde(rename = "Feria")]
    Weekday,
}

impl CelebrationType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Solemnity => "Solemnidad",
            Self::Feast => "Fiesta",
            Self::ObligatoryMemorial => "Memoria Obligatoria",
            Self::OptionalMemorial => "Memoria Libre",
            Self::Weekday => "Feria",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "cita")]
    pub citation: String,
    #[serde(rename = "texto")]
    pub text: String,
}

impl Reading {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiturgicalDay {
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "diaLiturgico")]
    pub label: String,
    #[serde(rename = "tiempoLiturgico")]
    pub season: LiturgicalSeason,
    #[serde(rename = "cicloDominical", default)]
    pub sunday_cycle: Option<SundayCycle>,
    #[serde(rename = "cicloFerial", default)]
    pub weekday_cycle: Option<WeekdayCycle>,
    #[serde(rename = "tipoCelebracion")]
    pub celebration: CelebrationType,
    #[serde(rename = "primeraLectura")]
    pub first_reading: Reading,
    #[serde(rename = "salmoResponsorial")]
    pub psalm: Reading,
    #[serde(rename = "segundaLectura", default)]
    pub second_reading: Option<Reading>,
    #[serde(rename = "evangelio")]
    pub gospel: Reading,
    /// Never taken from the collaborator; attached by the orchestrator.
    #[serde(
        rename = "audioSrc",
        skip_deserializing,
        skip_serializing_if = "Option::is_none"
    )]
    pub audio: Option<AudioHandle>,
}

impl LiturgicalDay {
    /// Readings in liturgical order with their Spanish titles.
    pub fn readings(&self) -> Vec<(&'static str, &Reading)> {
        let mut out = vec![
            ("Primera Lectura", &self.first_reading),
            ("Salmo Responsorial", &self.psalm),
        ];
        if let Some(second) = &self.second_reading {
            out.push(("Segunda Lectura", second));
        }
        out.push(("Evangelio", &self.gospel));
        out
    }
}
