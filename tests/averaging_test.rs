mod test_ensembles;

use adcp_average::average::{ChannelAverager, ReferenceLayerAverager};
use adcp_average::config::{AverageConfig, TriggerMode};
use adcp_average::constants::BAD_VELOCITY;
use adcp_average::ensemble::{ChannelKind, EnsembleSource, JsonLinesSource};
use adcp_average::processing::{run_averaging, spawn_reader, ticker};
use adcp_average::simulation::{EnsembleGenerator, SimulationConfig, profile_error};
use adcp_average::{AverageManager, Ensemble};
use approx::assert_relative_eq;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use test_ensembles::{ensemble, single_bin};

fn amplitude_only(window_size: usize, running_average: bool) -> AverageConfig {
    let mut config = AverageConfig {
        window_size,
        running_average,
        ..AverageConfig::default()
    };
    for kind in ChannelKind::ALL {
        config.channels.get_mut(kind).enabled = kind == ChannelKind::Amplitude;
    }
    config
}

fn amplitude(ens: &Ensemble) -> Vec<f32> {
    ens.amplitude.as_ref().unwrap()[0].clone()
}

#[test]
fn test_sentinel_sample_is_excluded_from_cell() {
    let mut manager = AverageManager::new(&amplitude_only(4, false));
    let values = [1.0, 2.0, BAD_VELOCITY, 5.0];

    let mut published = None;
    for (n, v) in values.iter().enumerate() {
        let data = single_bin(&[*v, 1.0, 1.0, 1.0]);
        published = manager
            .add_ensemble(ensemble(n as u32, ChannelKind::Amplitude, data, n as f32))
            .unwrap();
    }

    let avg = amplitude(&published.expect("window of 4 publishes"));
    assert_relative_eq!(avg[0], (1.0 + 2.0 + 5.0) / 3.0, epsilon = 1e-6);
    assert_relative_eq!(avg[1], 1.0);
}

#[test]
fn test_empty_window_has_no_average() {
    for kind in ChannelKind::ALL {
        let mut averager = ChannelAverager::new(kind, 3, false);
        assert!(averager.average(1.0).unwrap().is_none(), "{}", kind);
    }
    assert!(
        ReferenceLayerAverager::new(3, false, 1, 3)
            .average()
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_block_window_restarts_after_publish() {
    let mut manager = AverageManager::new(&amplitude_only(2, false));
    let samples = [
        single_bin(&[2.0, 3.0, 4.0, 5.0]),
        single_bin(&[BAD_VELOCITY; 4]),
        single_bin(&[6.0, 7.0, 8.0, 9.0]),
        single_bin(&[6.0, 7.0, 8.0, 9.0]),
    ];

    let mut outputs = Vec::new();
    for (n, data) in samples.into_iter().enumerate() {
        let out = manager
            .add_ensemble(ensemble(n as u32, ChannelKind::Amplitude, data, n as f32))
            .unwrap();
        outputs.push(out);
    }

    assert!(outputs[0].is_none());
    assert_eq!(amplitude(outputs[1].as_ref().unwrap()), vec![2.0, 3.0, 4.0, 5.0]);
    assert!(outputs[2].is_none(), "block window restarts after a publish");
    assert_eq!(amplitude(outputs[3].as_ref().unwrap()), vec![6.0, 7.0, 8.0, 9.0]);
}

#[test]
fn test_running_window_slides_by_one() {
    let mut manager = AverageManager::new(&amplitude_only(2, true));
    let samples = [
        [2.1, 3.1, 4.1, 5.1],
        [3.2, 4.2, 5.2, 6.2],
        [6.0, 7.0, 8.0, 9.0],
    ];

    let mut outputs = Vec::new();
    for (n, values) in samples.iter().enumerate() {
        if let Some(out) = manager
            .add_ensemble(ensemble(n as u32, ChannelKind::Amplitude, single_bin(values), n as f32))
            .unwrap()
        {
            outputs.push(amplitude(&out));
        }
    }

    assert_eq!(outputs.len(), 2);
    for (beam, expected) in [2.65, 3.65, 4.65, 5.65].iter().enumerate() {
        assert_relative_eq!(outputs[0][beam], *expected, epsilon = 1e-5);
    }
    for (beam, expected) in [4.6, 5.6, 6.6, 7.6].iter().enumerate() {
        assert_relative_eq!(outputs[1][beam], *expected, epsilon = 1e-5);
    }
}

#[test]
fn test_ping_metadata_is_aggregated() {
    let mut manager = AverageManager::new(&amplitude_only(3, false));
    let mut published = None;
    for (n, t) in [1.1f32, 2.2, 3.3].iter().enumerate() {
        published = manager
            .add_ensemble(ensemble(
                n as u32 + 1,
                ChannelKind::Amplitude,
                single_bin(&[1.0; 4]),
                *t,
            ))
            .unwrap();
    }

    let info = published.unwrap().info.unwrap();
    assert_eq!(info.actual_ping_count, 3);
    assert_eq!(info.desired_ping_count, 3);
    assert_relative_eq!(info.first_ping_time, 1.1);
    assert_relative_eq!(info.last_ping_time, 3.3);
    assert_eq!(info.ensemble_number, 3);
    assert_eq!(info.averaged_count, 3);
    assert!(info.averaged_at.is_some());
}

#[test]
fn test_json_lines_pipeline() {
    let lines: Vec<String> = (1..=6)
        .map(|n| {
            let ens = ensemble(n, ChannelKind::Correlation, single_bin(&[n as f32; 4]), n as f32);
            serde_json::to_string(&ens).unwrap()
        })
        .collect();
    let source = JsonLinesSource::new(Cursor::new(lines.join("\n")));

    let config = AverageConfig {
        window_size: 3,
        ..AverageConfig::default()
    };
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    let mut manager = AverageManager::new(&config);
    manager.subscribe(move |e| {
        sink.lock().unwrap().push(e.correlation.as_ref().unwrap()[0][0]);
    });

    let (rx, handle) = spawn_reader(source);
    let summary = run_averaging(&mut manager, &rx, &ticker(&config));
    assert_eq!(handle.join().unwrap().unwrap(), 6);
    assert_eq!(summary.published, 2);
    assert_eq!(*published.lock().unwrap(), vec![2.0, 5.0]);
}

#[test]
fn test_timer_ticks_ignored_under_count_trigger() {
    let mut manager = AverageManager::new(&amplitude_only(2, false));
    manager
        .add_ensemble(ensemble(1, ChannelKind::Amplitude, single_bin(&[1.0; 4]), 0.0))
        .unwrap();
    assert!(manager.on_timer_tick().unwrap().is_none());
    assert_eq!(manager.config().trigger, TriggerMode::SampleCount);
}

#[test]
fn test_averaging_reduces_simulated_noise() {
    let sim = SimulationConfig {
        dropout_probability: 0.0,
        min_valid_bins: 30,
        ..SimulationConfig::default()
    }
    .with_seed(11)
    .with_platform_drift(0.0)
    .with_noise(0.2);

    let mut generator = EnsembleGenerator::new(&sim).unwrap().limit(100);
    let truth = generator.truth().clone();
    let mut manager = AverageManager::new(&AverageConfig {
        window_size: 10,
        ..AverageConfig::default()
    });

    let mut raw_rms = 0.0;
    let mut avg_rms = Vec::new();
    while let Some(ens) = generator.next_ensemble().unwrap() {
        raw_rms += profile_error(&ens, &truth).rms / 100.0;
        if let Some(avg) = manager.add_ensemble(ens).unwrap() {
            avg_rms.push(profile_error(&avg, &truth).rms);
        }
    }

    assert_eq!(avg_rms.len(), 10);
    let mean_avg: f32 = avg_rms.iter().sum::<f32>() / avg_rms.len() as f32;
    assert!(
        mean_avg < raw_rms * 0.5,
        "averaged rms {} not below half of raw {}",
        mean_avg,
        raw_rms
    );
}
