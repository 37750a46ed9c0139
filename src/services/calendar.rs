// src/services/calendar.rs

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Tabela fixa de feriados (calendário israelense). Dias em que o
// movimento foge do padrão; a véspera é derivada, não listada.
const HOLIDAYS: &[(&str, &str)] = &[
    ("2024-04-23", "pesach"),
    ("2024-04-29", "pesach_vii"),
    ("2024-05-14", "independence_day"),
    ("2024-06-12", "shavuot"),
    ("2024-10-03", "rosh_hashanah"),
    ("2024-10-04", "rosh_hashanah_ii"),
    ("2024-10-12", "yom_kippur"),
    ("2024-10-17", "sukkot"),
    ("2024-10-24", "shemini_atzeret"),
    ("2025-04-13", "pesach"),
    ("2025-04-19", "pesach_vii"),
    ("2025-05-01", "independence_day"),
    ("2025-06-02", "shavuot"),
    ("2025-09-23", "rosh_hashanah"),
    ("2025-09-24", "rosh_hashanah_ii"),
    ("2025-10-02", "yom_kippur"),
    ("2025-10-07", "sukkot"),
    ("2025-10-14", "shemini_atzeret"),
    ("2026-04-02", "pesach"),
    ("2026-04-08", "pesach_vii"),
    ("2026-04-22", "independence_day"),
    ("2026-05-22", "shavuot"),
    ("2026-09-12", "rosh_hashanah"),
    ("2026-09-13", "rosh_hashanah_ii"),
    ("2026-09-21", "yom_kippur"),
    ("2026-09-26", "sukkot"),
    ("2026-10-03", "shemini_atzeret"),
];

/// Características de calendário, derivadas sem nenhum I/O.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarFeatures {
    /// Dia da semana na convenção local: 0 = domingo ... 6 = sábado.
    pub weekday: u8,
    /// Fim de semana local: sexta e sábado (os dois últimos dias da
    /// numeração 0-6).
    pub weekend: bool,
    pub holiday: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holiday_name: Option<String>,
    pub holiday_eve: bool,
    /// Virada do ano solar: 31/12 ou 01/01.
    pub year_boundary: bool,
}

fn holiday_name(date: NaiveDate) -> Option<&'static str> {
    let key = date.format("%Y-%m-%d").to_string();
    HOLIDAYS.iter().find(|(d, _)| *d == key).map(|(_, name)| *name)
}

/// Computa as características de calendário de uma data. Função pura:
/// mesmo input, mesmo output, sem relógio nem rede.
pub fn calendar_features(date: NaiveDate) -> CalendarFeatures {
    let weekday = date.weekday().num_days_from_sunday() as u8;
    let weekend = matches!(date.weekday(), Weekday::Fri | Weekday::Sat);

    let holiday = holiday_name(date);
    let tomorrow = date.checked_add_days(Days::new(1));
    let holiday_eve = tomorrow.map(|d| holiday_name(d).is_some()).unwrap_or(false);

    let year_boundary =
        (date.month() == 12 && date.day() == 31) || (date.month() == 1 && date.day() == 1);

    CalendarFeatures {
        weekday,
        weekend,
        holiday: holiday.is_some(),
        holiday_name: holiday.map(|s| s.to_string()),
        holiday_eve,
        year_boundary,
    }
}
