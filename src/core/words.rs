//! Integer amounts in words, for the printed representation of a document.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Spanish,
}

/// Render `amount` in upper-case words.
///
/// ```
/// use sifen::core::{Language, amount_in_words};
///
/// assert_eq!(amount_in_words(1_000_000, Language::English), "ONE MILLION");
/// assert_eq!(amount_in_words(21_000, Language::Spanish), "VEINTIÚN MIL");
/// ```
pub fn amount_in_words(amount: u64, language: Language) -> String {
    match language {
        Language::English => english(amount),
        Language::Spanish => spanish(amount),
    }
}

const EN_SMALL: [&str; 20] = [
    "ZERO", "ONE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN", "EIGHT", "NINE", "TEN",
    "ELEVEN", "TWELVE", "THIRTEEN", "FOURTEEN", "FIFTEEN", "SIXTEEN", "SEVENTEEN", "EIGHTEEN",
    "NINETEEN",
];

const EN_TENS: [&str; 10] = [
    "", "", "TWENTY", "THIRTY", "FORTY", "FIFTY", "SIXTY", "SEVENTY", "EIGHTY", "NINETY",
];

const EN_SCALES: [&str; 7] = [
    "",
    "THOUSAND",
    "MILLION",
    "BILLION",
    "TRILLION",
    "QUADRILLION",
    "QUINTILLION",
];

fn english(amount: u64) -> String {
    if amount == 0 {
        return EN_SMALL[0].to_string();
    }

    let mut groups = Vec::new();
    let mut rest = amount;
    while rest > 0 {
        groups.push((rest % 1000) as usize);
        rest /= 1000;
    }

    let mut parts = Vec::new();
    for (scale, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        parts.push(english_below_thousand(*group));
        if scale > 0 {
            parts.push(EN_SCALES[scale].to_string());
        }
    }
    parts.join(" ")
}

fn english_below_thousand(n: usize) -> String {
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} HUNDRED", EN_SMALL[hundreds]));
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(EN_SMALL[rest].to_string());
        } else if rest % 10 == 0 {
            parts.push(EN_TENS[rest / 10].to_string());
        } else {
            parts.push(format!("{}-{}", EN_TENS[rest / 10], EN_SMALL[rest % 10]));
        }
    }
    parts.join(" ")
}

const ES_UNITS: [&str; 30] = [
    "CERO",
    "UNO",
    "DOS",
    "TRES",
    "CUATRO",
    "CINCO",
    "SEIS",
    "SIETE",
    "OCHO",
    "NUEVE",
    "DIEZ",
    "ONCE",
    "DOCE",
    "TRECE",
    "CATORCE",
    "QUINCE",
    "DIECISÉIS",
    "DIECISIETE",
    "DIECIOCHO",
    "DIECINUEVE",
    "VEINTE",
    "VEINTIUNO",
    "VEINTIDÓS",
    "VEINTITRÉS",
    "VEINTICUATRO",
    "VEINTICINCO",
    "VEINTISÉIS",
    "VEINTISIETE",
    "VEINTIOCHO",
    "VEINTINUEVE",
];

const ES_TENS: [&str; 10] = [
    "", "", "", "TREINTA", "CUARENTA", "CINCUENTA", "SESENTA", "SETENTA", "OCHENTA", "NOVENTA",
];

const ES_HUNDREDS: [&str; 10] = [
    "",
    "CIENTO",
    "DOSCIENTOS",
    "TRESCIENTOS",
    "CUATROCIENTOS",
    "QUINIENTOS",
    "SEISCIENTOS",
    "SETECIENTOS",
    "OCHOCIENTOS",
    "NOVECIENTOS",
];

/// Long-scale names for powers of 10^6: (singular, plural).
const ES_SCALES: [(&str, &str); 4] = [
    ("", ""),
    ("MILLÓN", "MILLONES"),
    ("BILLÓN", "BILLONES"),
    ("TRILLÓN", "TRILLONES"),
];

fn spanish(amount: u64) -> String {
    if amount == 0 {
        return ES_UNITS[0].to_string();
    }

    let mut groups = Vec::new();
    let mut rest = amount;
    while rest > 0 {
        groups.push((rest % 1_000_000) as usize);
        rest /= 1_000_000;
    }

    let mut parts = Vec::new();
    for (scale, group) in groups.iter().enumerate().rev() {
        if *group == 0 {
            continue;
        }
        if scale == 0 {
            parts.push(spanish_below_million(*group, false));
        } else if *group == 1 {
            parts.push(format!("UN {}", ES_SCALES[scale].0));
        } else {
            parts.push(format!(
                "{} {}",
                spanish_below_million(*group, true),
                ES_SCALES[scale].1
            ));
        }
    }
    parts.join(" ")
}

/// `apocope` shortens a trailing "UNO" to "UN" before a noun ("UN MILLÓN").
fn spanish_below_million(n: usize, apocope: bool) -> String {
    let thousands = n / 1000;
    let rest = n % 1000;
    let mut parts = Vec::new();
    match thousands {
        0 => {}
        1 => parts.push("MIL".to_string()),
        t => parts.push(format!("{} MIL", spanish_below_thousand(t, true))),
    }
    if rest > 0 {
        parts.push(spanish_below_thousand(rest, apocope));
    }
    parts.join(" ")
}

fn spanish_below_thousand(n: usize, apocope: bool) -> String {
    if n == 100 {
        return "CIEN".to_string();
    }
    let hundreds = n / 100;
    let rest = n % 100;
    let mut parts = Vec::new();
    if hundreds > 0 {
        parts.push(ES_HUNDREDS[hundreds].to_string());
    }
    if rest > 0 {
        let words = if rest < 30 {
            match (rest, apocope) {
                (1, true) => "UN".to_string(),
                (21, true) => "VEINTIÚN".to_string(),
                _ => ES_UNITS[rest].to_string(),
            }
        } else if rest % 10 == 0 {
            ES_TENS[rest / 10].to_string()
        } else {
            let unit = if rest % 10 == 1 && apocope {
                "UN"
            } else {
                ES_UNITS[rest % 10]
            };
            format!("{} Y {}", ES_TENS[rest / 10], unit)
        };
        parts.push(words);
    }
    parts.join(" ")
}
