//! Four ETA estimation models, per SPEC_FULL.md §4.4.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaModel {
    Linear,
    Velocity,
    Historical,
    Hybrid,
}

#[derive(Debug, Clone, Copy)]
pub struct EtaEstimate {
    pub model: EtaModel,
    pub eta_seconds: f64,
    pub confidence: f64,
}

pub fn estimate(
    requested: Option<EtaModel>,
    progress_percent: f64,
    elapsed_seconds: f64,
    samples: &[(DateTime<Utc>, f64)],
    estimated_total_duration_seconds: Option<f64>,
) -> EtaEstimate {
    let model = requested.unwrap_or_else(|| auto_select(samples.len(), estimated_total_duration_seconds));
    match model {
        EtaModel::Linear => linear(progress_percent, elapsed_seconds),
        EtaModel::Velocity => velocity(samples).unwrap_or_else(|| linear(progress_percent, elapsed_seconds)),
        EtaModel::Historical => historical(elapsed_seconds, estimated_total_duration_seconds),
        EtaModel::Hybrid => hybrid(progress_percent, elapsed_seconds, samples, estimated_total_duration_seconds),
    }
}

fn auto_select(sample_count: usize, estimated_total: Option<f64>) -> EtaModel {
    if sample_count >= 3 {
        EtaModel::Velocity
    } else if estimated_total.is_some() {
        EtaModel::Historical
    } else {
        EtaModel::Linear
    }
}

fn linear(progress_percent: f64, elapsed_seconds: f64) -> EtaEstimate {
    if progress_percent <= 0.0 || elapsed_seconds <= 0.0 {
        return EtaEstimate {
            model: EtaModel::Linear,
            eta_seconds: f64::INFINITY,
            confidence: 0.0,
        };
    }
    let rate = progress_percent / elapsed_seconds;
    let remaining = (100.0 - progress_percent).max(0.0);
    EtaEstimate {
        model: EtaModel::Linear,
        eta_seconds: remaining / rate,
        confidence: (progress_percent / 100.0).min(0.9),
    }
}

fn velocity(samples: &[(DateTime<Utc>, f64)]) -> Option<EtaEstimate> {
    if samples.len() < 2 {
        return None;
    }
    let window: Vec<&(DateTime<Utc>, f64)> = samples.iter().rev().take(10).collect();
    let (last_t, last_p) = window[0];
    let (first_t, first_p) = window[window.len() - 1];
    let dt = (*last_t - *first_t).num_milliseconds() as f64 / 1000.0;
    if dt <= 0.0 {
        return None;
    }
    let slope = (last_p - first_p) / dt;
    if slope <= 0.0 {
        return None;
    }
    let remaining = (100.0 - last_p).max(0.0);
    let mean: f64 = window.iter().map(|(_, p)| *p).sum::<f64>() / window.len() as f64;
    let variance: f64 = window.iter().map(|(_, p)| (*p - mean).powi(2)).sum::<f64>() / window.len() as f64;
    Some(EtaEstimate {
        model: EtaModel::Velocity,
        eta_seconds: remaining / slope,
        confidence: 1.0 / (1.0 + variance),
    })
}

fn historical(elapsed_seconds: f64, estimated_total: Option<f64>) -> EtaEstimate {
    let total = estimated_total.unwrap_or(elapsed_seconds);
    EtaEstimate {
        model: EtaModel::Historical,
        eta_seconds: (total - elapsed_seconds).max(0.0),
        confidence: 0.7,
    }
}

fn hybrid(
    progress_percent: f64,
    elapsed_seconds: f64,
    samples: &[(DateTime<Utc>, f64)],
    estimated_total: Option<f64>,
) -> EtaEstimate {
    let lin = linear(progress_percent, elapsed_seconds);
    let vel = velocity(samples);
    let hist = historical(elapsed_seconds, estimated_total);

    let weighted = [(lin, 0.3), (hist, 0.2)]
        .into_iter()
        .chain(vel.map(|v| (v, 0.5)))
        .filter(|(e, _)| e.eta_seconds.is_finite())
        .collect::<Vec<_>>();

    if weighted.is_empty() {
        return lin;
    }
    let weight_sum: f64 = weighted.iter().map(|(e, w)| w * e.confidence).sum();
    if weight_sum <= 0.0 {
        return lin;
    }
    let eta = weighted.iter().map(|(e, w)| e.eta_seconds * w * e.confidence).sum::<f64>() / weight_sum;
    let confidence = weighted.iter().map(|(e, w)| e.confidence * w).sum::<f64>()
        / weighted.iter().map(|(_, w)| w).sum::<f64>();
    EtaEstimate {
        model: EtaModel::Hybrid,
        eta_seconds: eta,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_confidence_is_nondecreasing_with_progress() {
        let low = linear(10.0, 10.0);
        let high = linear(80.0, 80.0);
        assert!(high.confidence >= low.confidence);
    }

    #[test]
    fn auto_select_prefers_velocity_with_enough_samples() {
        assert_eq!(auto_select(5, None), EtaModel::Velocity);
        assert_eq!(auto_select(1, Some(100.0)), EtaModel::Historical);
        assert_eq!(auto_select(0, None), EtaModel::Linear);
    }

    #[test]
    fn historical_never_goes_negative() {
        let e = historical(200.0, Some(100.0));
        assert_eq!(e.eta_seconds, 0.0);
    }
}
