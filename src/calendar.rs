use chrono::NaiveDate;

/// Widest supported term. Concrete semesters are 10 or 15 weeks; callers
/// clamp against the semester they are importing into.
pub const MAX_WEEK_SPAN: i64 = 15;

const EXACT_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%Y.%m.%d",
    "%m.%d.%Y", "%d.%m.%Y",
];

/// Parse a scanner-supplied date string. Exact formats must round-trip
/// (so "1/5/2025" falls through to flexible recovery instead of being
/// accepted as a sloppy "%m/%d/%Y" hit).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in EXACT_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            if d.format(fmt).to_string() == t {
                return Some(d);
            }
        }
    }
    parse_date_flexible(t)
}

/// Recovery for 1-2 digit day/month forms. The US (month/day) reading is
/// tried before the international one and the first valid calendar date
/// wins, matching the upstream scanner-export behavior. Genuinely ambiguous
/// strings like "03/04/2025" therefore resolve as month/day.
fn parse_date_flexible(t: &str) -> Option<NaiveDate> {
    let sep = ['/', '-', '.'].into_iter().find(|s| t.contains(*s))?;
    let parts: Vec<&str> = t.split(sep).map(str::trim).collect();
    if parts.len() != 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.len() <= 4 && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let a: u32 = parts[0].parse().ok()?;
    let b: u32 = parts[1].parse().ok()?;
    let c: u32 = parts[2].parse().ok()?;

    if parts[0].len() == 4 {
        // Year-first with unpadded month/day is unambiguous.
        return NaiveDate::from_ymd_opt(a as i32, b, c);
    }
    if parts[2].len() != 4 || parts[0].len() > 2 || parts[1].len() > 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(c as i32, a, b).or_else(|| NaiveDate::from_ymd_opt(c as i32, b, a))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekError {
    BeforeSemesterStart,
    OutOfRange(i64),
}

impl WeekError {
    pub fn code(&self) -> &'static str {
        match self {
            WeekError::BeforeSemesterStart => "before_semester_start",
            WeekError::OutOfRange(_) => "week_out_of_range",
        }
    }
}

impl std::fmt::Display for WeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeekError::BeforeSemesterStart => write!(f, "date precedes the semester start"),
            WeekError::OutOfRange(w) => write!(f, "week {} is outside 1..={}", w, MAX_WEEK_SPAN),
        }
    }
}

/// 1-based week index of `date` within a semester starting at `start`.
/// Agnostic of the concrete semester's week count; only the global
/// 15-week ceiling is enforced here.
pub fn week_index(start: NaiveDate, date: NaiveDate) -> Result<i64, WeekError> {
    if date < start {
        return Err(WeekError::BeforeSemesterStart);
    }
    let week = (date - start).num_days() / 7 + 1;
    if !(1..=MAX_WEEK_SPAN).contains(&week) {
        return Err(WeekError::OutOfRange(week));
    }
    Ok(week)
}
