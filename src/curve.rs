//! Fan curve parsing and evaluation.
//!
//! A curve is written as `<TEMP>:<SPEED>` points separated by commas or whitespace, e.g.
//! `35:30,60:70`. Adjacent points form [`Slope`]s; the fan speed for a temperature is read off
//! the slope containing it.

use std::io::{self, Write};

use thiserror::Error;

/// Highest temperature a curve may reach without `--force`.
pub const DEFAULT_MAX_TEMPERATURE: u32 = 80;

const MAX_FAN_SPEED: u32 = 100;

pub type CurveResult<T> = Result<T, CurveError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurveError {
    #[error("Invalid curve point: {0:?}")]
    InvalidCurvePoint(String),

    #[error("Negative fan curve")]
    NegativeFanCurve,

    #[error("Duplicate temperature point: {0}")]
    DuplicateTemperature(u32),

    #[error("Incorrect temperature order")]
    TemperatureOrder,

    #[error("Too few curve points. At least two required")]
    TooFewCurvePoints,

    #[error("Fan speed value outside acceptable range: {0}")]
    InvalidFanSpeed(u32),

    #[error("Curve point temperature {temperature} exceeds max. temperature {max}")]
    MaxTemperatureExceeded { temperature: u32, max: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurvePoint {
    pub temperature: u32,
    pub fan_speed: u32,
}

/// Straight segment between two curve points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slope {
    start: CurvePoint,
    end: CurvePoint,
}

impl Slope {
    /// # Panics
    /// Panics unless `start` is strictly cooler than `end`.
    pub fn new(start: CurvePoint, end: CurvePoint) -> Self {
        assert!(
            start.temperature < end.temperature,
            "slope must span increasing temperatures"
        );

        Self { start, end }
    }

    pub fn start(&self) -> CurvePoint {
        self.start
    }

    pub fn end(&self) -> CurvePoint {
        self.end
    }

    /// Fan speed at `temperature` on the line through both points, truncated.
    pub fn at(&self, temperature: u32) -> u32 {
        let rise = i64::from(self.end.fan_speed) - i64::from(self.start.fan_speed);
        let run = i64::from(self.end.temperature) - i64::from(self.start.temperature);
        let offset = i64::from(temperature) - i64::from(self.start.temperature);

        let speed = i64::from(self.start.fan_speed) + rise * offset / run;
        speed.clamp(0, i64::from(u32::MAX)) as u32
    }
}

/// Parses one `<TEMP>:<SPEED>` point.
pub fn parse_curve_point(input: &str) -> CurveResult<CurvePoint> {
    let invalid = || CurveError::InvalidCurvePoint(input.to_string());

    let mut parts = input.trim().split(':');
    let (Some(temperature), Some(fan_speed), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let parse = |text: &str| {
        if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(invalid());
        }
        text.parse::<u32>().map_err(|_| invalid())
    };

    Ok(CurvePoint {
        temperature: parse(temperature)?,
        fan_speed: parse(fan_speed)?,
    })
}

fn is_delimiter(c: char) -> bool {
    matches!(c, ',' | ' ' | '\t' | '\r' | '\n')
}

fn validate_points(points: &[CurvePoint], max_temperature: u32) -> CurveResult<()> {
    for point in points {
        if point.fan_speed > MAX_FAN_SPEED {
            return Err(CurveError::InvalidFanSpeed(point.fan_speed));
        }
        if point.temperature > max_temperature {
            return Err(CurveError::MaxTemperatureExceeded {
                temperature: point.temperature,
                max: max_temperature,
            });
        }
    }

    for pair in points.windows(2) {
        let (first, second) = (pair[0], pair[1]);

        if first.fan_speed > second.fan_speed {
            return Err(CurveError::NegativeFanCurve);
        }
        if first.temperature == second.temperature {
            return Err(CurveError::DuplicateTemperature(first.temperature));
        }
        if first.temperature > second.temperature {
            return Err(CurveError::TemperatureOrder);
        }
    }

    Ok(())
}

/// Parses and validates a curve definition.
///
/// # Arguments
/// * `text` - Points separated by commas or whitespace
/// * `max_temperature` - No point may lie above it; a curve ending below it is extended to
///   full speed at this temperature
///
/// # Returns
/// The slopes between adjacent points, empty for an empty definition
pub fn parse_curve(text: &str, max_temperature: u32) -> CurveResult<Vec<Slope>> {
    let mut points = text
        .split(is_delimiter)
        .filter(|piece| !piece.is_empty())
        .map(parse_curve_point)
        .collect::<CurveResult<Vec<_>>>()?;

    if points.len() == 1 {
        return Err(CurveError::TooFewCurvePoints);
    }

    validate_points(&points, max_temperature)?;

    if let Some(last) = points.last()
        && last.temperature < max_temperature
    {
        points.push(CurvePoint {
            temperature: max_temperature,
            fan_speed: MAX_FAN_SPEED,
        });
    }

    Ok(points
        .windows(2)
        .map(|pair| Slope::new(pair[0], pair[1]))
        .collect())
}

/// Validated fan curve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Curve {
    slopes: Vec<Slope>,
}

impl Curve {
    /// See [`parse_curve`].
    pub fn parse(text: &str, max_temperature: u32) -> CurveResult<Self> {
        parse_curve(text, max_temperature).map(|slopes| Self { slopes })
    }

    pub fn slopes(&self) -> &[Slope] {
        &self.slopes
    }

    pub fn is_empty(&self) -> bool {
        self.slopes.is_empty()
    }

    /// Target fan speed for `temperature`.
    ///
    /// 0 for an empty curve and below the first point, full curve speed above the last point.
    /// A speed of 0 means the device should follow its own policy.
    pub fn value_at(&self, temperature: u32) -> u32 {
        let Some(last) = self.slopes.last() else {
            return 0;
        };

        let index = self
            .slopes
            .partition_point(|slope| slope.end.temperature < temperature);

        let Some(slope) = self.slopes.get(index) else {
            return last.end.fan_speed;
        };

        if temperature < slope.start.temperature {
            return 0;
        }

        slope.at(temperature)
    }

    /// Writes the curve as a `temperature fan_speed` table, one point per line.
    ///
    /// A curve starting above 0 degrees is prefixed by the implicit `0 0` and `<first> 0`
    /// points. An empty curve writes nothing.
    pub fn write_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let Some(first) = self.slopes.first() else {
            return Ok(());
        };

        writeln!(out, "temperature fan_speed")?;
        if first.start.temperature > 0 {
            writeln!(out, "0 0")?;
            writeln!(out, "{} 0", first.start.temperature)?;
        }
        writeln!(out, "{} {}", first.start.temperature, first.start.fan_speed)?;

        for slope in &self.slopes {
            writeln!(out, "{} {}", slope.end.temperature, slope.end.fan_speed)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(temperature: u32, fan_speed: u32) -> CurvePoint {
        CurvePoint {
            temperature,
            fan_speed,
        }
    }

    #[test]
    fn parses_points_with_mixed_delimiters() {
        let slopes = parse_curve("30:20, 50:40\t60:70\n", 80).unwrap();

        assert_eq!(
            slopes,
            vec![
                Slope::new(point(30, 20), point(50, 40)),
                Slope::new(point(50, 40), point(60, 70)),
                Slope::new(point(60, 70), point(80, 100)),
            ]
        );
    }

    #[test]
    fn curve_reaching_max_is_not_extended() {
        let slopes = parse_curve("30:20,80:90", 80).unwrap();
        assert_eq!(slopes, vec![Slope::new(point(30, 20), point(80, 90))]);
    }

    #[test]
    fn empty_definition_gives_empty_curve() {
        assert!(parse_curve("", 80).unwrap().is_empty());
        assert!(parse_curve(" ,, ", 80).unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_definitions() {
        assert_eq!(parse_curve("30:20", 80), Err(CurveError::TooFewCurvePoints));
        assert_eq!(
            parse_curve("30:20,40", 80),
            Err(CurveError::InvalidCurvePoint("40".to_string()))
        );
        assert_eq!(
            parse_curve("30:-1,40:20", 80),
            Err(CurveError::InvalidCurvePoint("30:-1".to_string()))
        );
        assert_eq!(
            parse_curve("30:20:1,40:20", 80),
            Err(CurveError::InvalidCurvePoint("30:20:1".to_string()))
        );
        assert_eq!(
            parse_curve("30:50,40:20", 80),
            Err(CurveError::NegativeFanCurve)
        );
        assert_eq!(
            parse_curve("30:20,30:40", 80),
            Err(CurveError::DuplicateTemperature(30))
        );
        assert_eq!(
            parse_curve("40:20,30:40", 80),
            Err(CurveError::TemperatureOrder)
        );
        assert_eq!(
            parse_curve("30:20,40:101", 80),
            Err(CurveError::InvalidFanSpeed(101))
        );
        assert_eq!(
            parse_curve("30:20,90:40", 80),
            Err(CurveError::MaxTemperatureExceeded {
                temperature: 90,
                max: 80
            })
        );
    }

    #[test]
    fn value_at_follows_the_curve() {
        let curve = Curve::parse("30:20,50:40,60:70", 80).unwrap();

        assert_eq!(curve.value_at(0), 0);
        assert_eq!(curve.value_at(29), 0);
        assert_eq!(curve.value_at(30), 20);
        assert_eq!(curve.value_at(40), 30);
        assert_eq!(curve.value_at(50), 40);
        assert_eq!(curve.value_at(55), 55);
        assert_eq!(curve.value_at(70), 85);
        assert_eq!(curve.value_at(80), 100);
        assert_eq!(curve.value_at(95), 100);
    }

    #[test]
    fn empty_curve_leaves_fans_to_the_device() {
        assert_eq!(Curve::default().value_at(70), 0);
    }

    #[test]
    fn table_includes_implicit_start() {
        let curve = Curve::parse("30:20,60:70", 80).unwrap();
        let mut out = Vec::new();
        curve.write_table(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "temperature fan_speed\n0 0\n30 0\n30 20\n60 70\n80 100\n"
        );
    }

    #[test]
    fn table_starting_at_zero_has_no_prefix() {
        let curve = Curve::parse("0:10,80:100", 80).unwrap();
        let mut out = Vec::new();
        curve.write_table(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "temperature fan_speed\n0 10\n80 100\n"
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn curve_text() -> impl Strategy<Value = String> {
        prop::collection::btree_map(0u32..=80, 0u32..=100, 2..8).prop_map(|points| {
            let mut speeds: Vec<u32> = points.values().copied().collect();
            speeds.sort_unstable();

            points
                .keys()
                .zip(speeds)
                .map(|(temperature, speed)| format!("{temperature}:{speed}"))
                .collect::<Vec<_>>()
                .join(",")
        })
    }

    proptest! {
        #[test]
        fn value_at_is_monotone_and_bounded(text in curve_text(), a in 0u32..120, b in 0u32..120) {
            let curve = Curve::parse(&text, DEFAULT_MAX_TEMPERATURE).unwrap();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };

            let low_speed = curve.value_at(low);
            let high_speed = curve.value_at(high);

            prop_assert!(high_speed <= 100);
            // Below the first point the device policy applies, so only compare on the curve.
            if low >= curve.slopes()[0].start().temperature {
                prop_assert!(low_speed <= high_speed);
            }
        }
    }
}
