use crate::error::DepGraphError;

/// A single cron field: a wildcard, a number, a range, a step, or a
/// comma-separated list of any of the above (spec §6: "five-or-six
/// whitespace-separated fields, each a `*`, a number, a range, a step, or a
/// comma list").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    Wildcard,
    Number(u32),
    Range(u32, u32),
    Step { base: Box<CronField>, step: u32 },
    List(Vec<CronField>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
    pub year: Option<CronField>,
}

const RANGES: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 7)];

/// Parse and validate a standard 5-or-6-field cron expression. Fewer/more
/// fields are rejected with `INVALID_CRON` (spec §6).
pub fn parse_cron(expr: &str) -> Result<CronSchedule, DepGraphError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 && fields.len() != 6 {
        return Err(DepGraphError::InvalidCron { found: fields.len() });
    }

    let mut parsed = Vec::with_capacity(6);
    for (i, field) in fields.iter().take(5).enumerate() {
        let (min, max) = RANGES[i];
        parsed.push(parse_field(field, min, max)?);
    }
    let year = if fields.len() == 6 { Some(parse_field(fields[5], 1970, 2099)?) } else { None };

    Ok(CronSchedule {
        minute: parsed[0].clone(),
        hour: parsed[1].clone(),
        day_of_month: parsed[2].clone(),
        month: parsed[3].clone(),
        day_of_week: parsed[4].clone(),
        year,
    })
}

fn parse_field(raw: &str, min: u32, max: u32) -> Result<CronField, DepGraphError> {
    if raw.contains(',') {
        let items = raw.split(',').map(|part| parse_field(part, min, max)).collect::<Result<Vec<_>, _>>()?;
        return Ok(CronField::List(items));
    }

    if let Some((base_raw, step_raw)) = raw.split_once('/') {
        let step: u32 = step_raw.parse().map_err(|_| invalid_field())?;
        if step == 0 {
            return Err(invalid_field());
        }
        let base = if base_raw == "*" { CronField::Wildcard } else { parse_field(base_raw, min, max)? };
        return Ok(CronField::Step { base: Box::new(base), step });
    }

    if raw == "*" {
        return Ok(CronField::Wildcard);
    }

    if let Some((lo_raw, hi_raw)) = raw.split_once('-') {
        let lo: u32 = lo_raw.parse().map_err(|_| invalid_field())?;
        let hi: u32 = hi_raw.parse().map_err(|_| invalid_field())?;
        if lo > hi || lo < min || hi > max {
            return Err(invalid_field());
        }
        return Ok(CronField::Range(lo, hi));
    }

    let value: u32 = raw.parse().map_err(|_| invalid_field())?;
    if value < min || value > max {
        return Err(invalid_field());
    }
    Ok(CronField::Number(value))
}

fn invalid_field() -> DepGraphError {
    DepGraphError::InvalidCron { found: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_five_field_schedule() {
        let schedule = parse_cron("0 3 * * 1-5").unwrap();
        assert_eq!(schedule.hour, CronField::Number(3));
        assert_eq!(schedule.day_of_week, CronField::Range(1, 5));
        assert!(schedule.year.is_none());
    }

    #[test]
    fn parses_six_field_schedule_with_year() {
        let schedule = parse_cron("0 0 1 1 * 2026").unwrap();
        assert_eq!(schedule.year, Some(CronField::Number(2026)));
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = parse_cron("0 3 * *").unwrap_err();
        assert!(matches!(err, DepGraphError::InvalidCron { found: 4 }));
    }

    #[test]
    fn parses_step_and_list_fields() {
        let schedule = parse_cron("*/15 * * * *").unwrap();
        assert!(matches!(schedule.minute, CronField::Step { step: 15, .. }));

        let schedule = parse_cron("0,30 * * * *").unwrap();
        assert!(matches!(schedule.minute, CronField::List(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_cron("60 * * * *").is_err());
        assert!(parse_cron("* * * 13 *").is_err());
    }
}
