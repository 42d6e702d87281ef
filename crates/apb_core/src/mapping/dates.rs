//! Partial-date synthesis.
//!
//! Catalog rows carry year, month and day in separate, often blank, cells.
//! They are combined into a fixed-width `YYYY-MM-DD` string where unknown
//! parts are zero (`1947-00-00`). Validation is per component and fail-fast:
//! one bad component invalidates the whole date.

/// Placeholder written when neither the primary nor the fallback source
/// has any date information.
pub const UNKNOWN_DATE: &str = "0000-00-00";

/// Raw year/month/day cells from one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateParts<'a> {
    pub year: Option<&'a str>,
    pub month: Option<&'a str>,
    pub day: Option<&'a str>,
}

impl<'a> DateParts<'a> {
    pub fn new(year: Option<&'a str>, month: Option<&'a str>, day: Option<&'a str>) -> Self {
        Self { year, month, day }
    }
}

/// Outcome of synthesizing one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOutcome {
    /// A `YYYY-MM-DD` string.
    Date(String),
    /// Every component was blank or missing.
    Blank,
    /// A present component failed validation.
    Invalid(String),
}

impl DateOutcome {
    /// The rendered form: the date, or `""` for blank and invalid sources.
    pub fn as_str(&self) -> &str {
        match self {
            DateOutcome::Date(date) => date,
            DateOutcome::Blank | DateOutcome::Invalid(_) => "",
        }
    }
}

/// Parse one component. `Ok(None)` for blank cells.
///
/// Spreadsheet exports often render whole numbers as `6.0`, so integral
/// decimals are accepted.
fn parse_component(raw: Option<&str>, name: &str) -> Result<Option<u32>, String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(value) = raw.parse::<i64>() {
        return u32::try_from(value)
            .map(Some)
            .map_err(|_| format!("{} '{}' is out of range", name, raw));
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value >= 0.0 => {
            if value > f64::from(u32::MAX) {
                Err(format!("{} '{}' is out of range", name, raw))
            } else {
                Ok(Some(value as u32))
            }
        }
        _ => Err(format!("{} '{}' is not a number", name, raw)),
    }
}

/// Combine one source's cells into a date.
pub fn synthesize(parts: DateParts<'_>) -> DateOutcome {
    let parsed = (|| -> Result<(Option<u32>, Option<u32>, Option<u32>), String> {
        let year = parse_component(parts.year, "year")?;
        let month = parse_component(parts.month, "month")?;
        let day = parse_component(parts.day, "day")?;

        if let Some(y) = year {
            if !(1..=9999).contains(&y) {
                return Err(format!("year {} is outside 1-9999", y));
            }
        }
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(format!("month {} is outside 1-12", m));
            }
        }
        if let Some(d) = day {
            if !(1..=31).contains(&d) {
                return Err(format!("day {} is outside 1-31", d));
            }
        }
        Ok((year, month, day))
    })();

    match parsed {
        Err(reason) => DateOutcome::Invalid(reason),
        Ok((None, None, None)) => DateOutcome::Blank,
        Ok((year, month, day)) => DateOutcome::Date(format!(
            "{:04}-{:02}-{:02}",
            year.unwrap_or(0),
            month.unwrap_or(0),
            day.unwrap_or(0)
        )),
    }
}

/// Combine one source's cells into a date string; `""` when blank or invalid.
pub fn synthesize_date(parts: DateParts<'_>) -> String {
    synthesize(parts).as_str().to_string()
}

/// Final `DateCreated` value for a record.
///
/// The primary source wins when it yields a date; otherwise the fallback
/// source is tried. Only when both are blank is [`UNKNOWN_DATE`] used; an
/// invalid source with no usable alternative yields `""`.
pub fn resolve_date_created(primary: &DateOutcome, fallback: &DateOutcome) -> String {
    match (primary, fallback) {
        (DateOutcome::Date(date), _) => date.clone(),
        (_, DateOutcome::Date(date)) => date.clone(),
        (DateOutcome::Blank, DateOutcome::Blank) => UNKNOWN_DATE.to_string(),
        _ => String::new(),
    }
}
