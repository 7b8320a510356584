//! Weather trend summary from an hourly forecast
//!
//! Pressure tendency is the change over the first 3 hours:
//!
//! | Δp (hPa)      | Tendency        |
//! |---------------|-----------------|
//! | ≤ −2.0        | falling rapidly |
//! | ≤ −0.5        | falling         |
//! | ≥ +2.0        | rising rapidly  |
//! | ≥ +0.5        | rising          |
//! | otherwise     | stable          |
//!
//! Wind shift compares the circular mean direction of the first and last
//! 6 hours of the horizon; speed change compares their mean speeds.

use crate::{FeedError, Result};
use site_suitability::{angular_distance, normalize_bearing, PressureTrend, WeatherTrend, WindTrend};

const TENDENCY_WINDOW_H: usize = 3;
const WIND_WINDOW_H: usize = 6;
/// Longest horizon considered (hours)
pub const TREND_HORIZON_H: usize = 48;

/// Hourly values starting at the current hour
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HourlySeries {
    pub wind_direction_deg: Vec<f64>,
    pub wind_speed: Vec<f64>,
    pub pressure_hpa: Vec<f64>,
}

pub fn classify_pressure(change_hpa: f64) -> PressureTrend {
    if change_hpa <= -2.0 {
        PressureTrend::FallingRapidly
    } else if change_hpa <= -0.5 {
        PressureTrend::Falling
    } else if change_hpa >= 2.0 {
        PressureTrend::RisingRapidly
    } else if change_hpa >= 0.5 {
        PressureTrend::Rising
    } else {
        PressureTrend::Stable
    }
}

fn circular_mean(directions: &[f64]) -> Option<f64> {
    if directions.is_empty() {
        return None;
    }
    let (sin, cos) = directions.iter().fold((0.0, 0.0), |(s, c), d| {
        let r = d.to_radians();
        (s + r.sin(), c + r.cos())
    });
    if sin.abs() < 1e-12 && cos.abs() < 1e-12 {
        return None;
    }
    Some(normalize_bearing(sin.atan2(cos).to_degrees()))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .take(TREND_HORIZON_H)
        .copied()
        .filter(|v| v.is_finite())
        .collect()
}

/// Summarise up to 48 hours of forecast into a [`WeatherTrend`]
pub fn summarize_trend(series: &HourlySeries) -> Result<WeatherTrend> {
    let pressure = finite(&series.pressure_hpa);
    if pressure.len() <= TENDENCY_WINDOW_H {
        return Err(FeedError::Insufficient(format!(
            "{} pressure values, need more than {}",
            pressure.len(),
            TENDENCY_WINDOW_H
        )));
    }
    let tendency = classify_pressure(pressure[TENDENCY_WINDOW_H] - pressure[0]);

    let directions = finite(&series.wind_direction_deg);
    let speeds = finite(&series.wind_speed);
    let window = WIND_WINDOW_H.min(directions.len() / 2).min(speeds.len() / 2);
    if window == 0 {
        return Err(FeedError::Insufficient("need at least two hourly wind values".to_string()));
    }

    let early_dir = circular_mean(&directions[..window]);
    let late_dir = circular_mean(&directions[directions.len() - window..]);
    let direction_shift_deg = match (early_dir, late_dir) {
        (Some(a), Some(b)) => angular_distance(a, b),
        _ => 0.0,
    };
    let speed_change = match (mean(&speeds[..window]), mean(&speeds[speeds.len() - window..])) {
        (Some(a), Some(b)) => b - a,
        _ => 0.0,
    };

    Ok(WeatherTrend {
        wind: WindTrend {
            direction_shift_deg,
            speed_change,
        },
        pressure: tendency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pressure() {
        assert_eq!(classify_pressure(-3.0), PressureTrend::FallingRapidly);
        assert_eq!(classify_pressure(-2.0), PressureTrend::FallingRapidly);
        assert_eq!(classify_pressure(-1.0), PressureTrend::Falling);
        assert_eq!(classify_pressure(0.2), PressureTrend::Stable);
        assert_eq!(classify_pressure(0.5), PressureTrend::Rising);
        assert_eq!(classify_pressure(2.5), PressureTrend::RisingRapidly);
    }

    #[test]
    fn test_front_passage() {
        let hours = 24;
        let series = HourlySeries {
            // Southerly veering to north-westerly
            wind_direction_deg: (0..hours).map(|h| if h < 12 { 180.0 } else { 300.0 }).collect(),
            wind_speed: (0..hours).map(|h| if h < 12 { 5.0 } else { 15.0 }).collect(),
            pressure_hpa: (0..hours).map(|h| 1012.0 - h as f64).collect(),
        };
        let trend = summarize_trend(&series).unwrap();
        assert_eq!(trend.pressure, PressureTrend::FallingRapidly);
        assert!((trend.wind.direction_shift_deg - 120.0).abs() < 1e-9);
        assert!((trend.wind.speed_change - 10.0).abs() < 1e-9);
        assert!(trend.front_strength() > 0.9);
    }

    #[test]
    fn test_shift_across_north() {
        let series = HourlySeries {
            wind_direction_deg: vec![350.0, 355.0, 10.0, 15.0],
            wind_speed: vec![5.0; 4],
            pressure_hpa: vec![1013.0; 4],
        };
        let trend = summarize_trend(&series).unwrap();
        assert!((trend.wind.direction_shift_deg - 20.0).abs() < 1e-6);
        assert_eq!(trend.pressure, PressureTrend::Stable);
    }

    #[test]
    fn test_insufficient_data() {
        let series = HourlySeries {
            wind_direction_deg: vec![180.0],
            wind_speed: vec![5.0],
            pressure_hpa: vec![1013.0, 1012.0],
        };
        assert!(matches!(summarize_trend(&series), Err(FeedError::Insufficient(_))));
    }

    #[test]
    fn test_non_finite_dropped() {
        let series = HourlySeries {
            wind_direction_deg: vec![90.0, f64::NAN, 90.0, 90.0],
            wind_speed: vec![4.0, 4.0, f64::NAN, 4.0],
            pressure_hpa: vec![1010.0, f64::NAN, 1010.2, 1010.4, 1010.6],
        };
        let trend = summarize_trend(&series).unwrap();
        assert_eq!(trend.pressure, PressureTrend::Rising);
        assert!(trend.wind.direction_shift_deg < 1e-9);
    }
}
