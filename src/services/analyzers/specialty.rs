//! Specialty
//!
//! Closed set of specialist analyzers the panel can dispatch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::EngineError;

/// One medical specialty backed by an analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Allergy,
    Angiology,
    Cardiology,
    Dermatology,
    Endocrinology,
    Gastroenterology,
    Genetics,
    Geriatrics,
    Gynecology,
    Hematology,
    Infectology,
    Mastology,
    Nephrology,
    Neurology,
    Nutrition,
    Oncology,
    Ophthalmology,
    Orthopedics,
    Otolaryngology,
    Pediatrics,
    Psychiatry,
    Pulmonology,
    Radiology,
    Rheumatology,
    SportsMedicine,
    Urology,
}

impl Specialty {
    /// Every specialty, in panel order.
    pub const ALL: [Specialty; 26] = [
        Specialty::Allergy,
        Specialty::Angiology,
        Specialty::Cardiology,
        Specialty::Dermatology,
        Specialty::Endocrinology,
        Specialty::Gastroenterology,
        Specialty::Genetics,
        Specialty::Geriatrics,
        Specialty::Gynecology,
        Specialty::Hematology,
        Specialty::Infectology,
        Specialty::Mastology,
        Specialty::Nephrology,
        Specialty::Neurology,
        Specialty::Nutrition,
        Specialty::Oncology,
        Specialty::Ophthalmology,
        Specialty::Orthopedics,
        Specialty::Otolaryngology,
        Specialty::Pediatrics,
        Specialty::Psychiatry,
        Specialty::Pulmonology,
        Specialty::Radiology,
        Specialty::Rheumatology,
        Specialty::SportsMedicine,
        Specialty::Urology,
    ];

    /// Stable key used in configuration, usage records and reports.
    pub fn key(&self) -> &'static str {
        match self {
            Specialty::Allergy => "allergy",
            Specialty::Angiology => "angiology",
            Specialty::Cardiology => "cardiology",
            Specialty::Dermatology => "dermatology",
            Specialty::Endocrinology => "endocrinology",
            Specialty::Gastroenterology => "gastroenterology",
            Specialty::Genetics => "genetics",
            Specialty::Geriatrics => "geriatrics",
            Specialty::Gynecology => "gynecology",
            Specialty::Hematology => "hematology",
            Specialty::Infectology => "infectology",
            Specialty::Mastology => "mastology",
            Specialty::Nephrology => "nephrology",
            Specialty::Neurology => "neurology",
            Specialty::Nutrition => "nutrition",
            Specialty::Oncology => "oncology",
            Specialty::Ophthalmology => "ophthalmology",
            Specialty::Orthopedics => "orthopedics",
            Specialty::Otolaryngology => "otolaryngology",
            Specialty::Pediatrics => "pediatrics",
            Specialty::Psychiatry => "psychiatry",
            Specialty::Pulmonology => "pulmonology",
            Specialty::Radiology => "radiology",
            Specialty::Rheumatology => "rheumatology",
            Specialty::SportsMedicine => "sports_medicine",
            Specialty::Urology => "urology",
        }
    }

    /// Title of the specialist, as shown to the synthesizer and in reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Specialty::Allergy => "Allergist",
            Specialty::Angiology => "Angiologist",
            Specialty::Cardiology => "Cardiologist",
            Specialty::Dermatology => "Dermatologist",
            Specialty::Endocrinology => "Endocrinologist",
            Specialty::Gastroenterology => "Gastroenterologist",
            Specialty::Genetics => "Geneticist",
            Specialty::Geriatrics => "Geriatrician",
            Specialty::Gynecology => "Gynecologist",
            Specialty::Hematology => "Hematologist",
            Specialty::Infectology => "Infectious Disease Specialist",
            Specialty::Mastology => "Mastologist",
            Specialty::Nephrology => "Nephrologist",
            Specialty::Neurology => "Neurologist",
            Specialty::Nutrition => "Nutritionist",
            Specialty::Oncology => "Oncologist",
            Specialty::Ophthalmology => "Ophthalmologist",
            Specialty::Orthopedics => "Orthopedist",
            Specialty::Otolaryngology => "Otolaryngologist",
            Specialty::Pediatrics => "Pediatrician",
            Specialty::Psychiatry => "Psychiatrist",
            Specialty::Pulmonology => "Pulmonologist",
            Specialty::Radiology => "Radiologist",
            Specialty::Rheumatology => "Rheumatologist",
            Specialty::SportsMedicine => "Sports Medicine Physician",
            Specialty::Urology => "Urologist",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Specialty {
    type Err = EngineError;

    /// Accepts the key or the display name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace([' ', '-'], "_");
        Specialty::ALL
            .iter()
            .copied()
            .find(|sp| {
                sp.key() == wanted || sp.display_name().to_lowercase().replace(' ', "_") == wanted
            })
            .ok_or_else(|| EngineError::config(format!("unknown specialty '{}'", s.trim())))
    }
}
