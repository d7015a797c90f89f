use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, bounded, never, select, tick};

use crate::average::AverageManager;
use crate::config::{AverageConfig, TriggerMode};
use crate::ensemble::{Ensemble, EnsembleSource};
use crate::error::Result;

/// Counters for one averaging run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ensembles: usize,
    pub published: usize,
    pub failed: usize,
}

enum Event {
    Arrival(Ensemble),
    Tick,
    TimerStopped,
    Closed,
}

/// Timer channel for `config`: periodic ticks with the timer trigger,
/// a channel that never fires otherwise
pub fn ticker(config: &AverageConfig) -> Receiver<Instant> {
    match config.trigger {
        TriggerMode::Timer => tick(config.normalized().timer_interval()),
        TriggerMode::SampleCount => never(),
    }
}

/// Read `source` on its own thread
///
/// The returned channel closes when the source is exhausted or fails; the
/// join handle yields the number of ensembles read or the source error.
pub fn spawn_reader<S>(mut source: S) -> (Receiver<Ensemble>, JoinHandle<Result<usize>>)
where
    S: EnsembleSource + 'static,
{
    let (tx, rx) = bounded(64);
    let handle = thread::spawn(move || -> Result<usize> {
        let mut count = 0;
        while let Some(ensemble) = source.next_ensemble()? {
            if tx.send(ensemble).is_err() {
                log::warn!("Ensemble receiver dropped");
                break;
            }
            count += 1;
        }
        Ok(count)
    });
    (rx, handle)
}

/// Feed arrivals and timer ticks into `manager` from one thread
///
/// Runs until the ensemble channel closes. A failed average is logged and
/// counted; the run continues with the next ensemble.
pub fn run_averaging(
    manager: &mut AverageManager,
    ensembles: &Receiver<Ensemble>,
    ticks: &Receiver<Instant>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut ticks = ticks.clone();

    loop {
        let event = select! {
            recv(ensembles) -> msg => msg.map_or(Event::Closed, Event::Arrival),
            recv(ticks) -> msg => msg.map_or(Event::TimerStopped, |_| Event::Tick),
        };

        let outcome = match event {
            Event::Arrival(ensemble) => {
                summary.ensembles += 1;
                manager.add_ensemble(ensemble)
            }
            Event::Tick => manager.on_timer_tick(),
            Event::TimerStopped => {
                ticks = never();
                continue;
            }
            Event::Closed => break,
        };

        match outcome {
            Ok(Some(_)) => summary.published += 1,
            Ok(None) => {}
            Err(e) => {
                log::warn!("Average not published: {}", e);
                summary.failed += 1;
            }
        }
    }

    log::debug!(
        "averaging finished: {} ensembles in, {} averages out, {} failed",
        summary.ensembles,
        summary.published,
        summary.failed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{ChannelKind, EnsembleInfo, MemorySource};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn ensembles(count: u32) -> Vec<Ensemble> {
        (1..=count)
            .map(|n| {
                Ensemble::new(EnsembleInfo::new(n, 1, 4))
                    .with_channel(ChannelKind::Amplitude, vec![vec![n as f32; 4]])
            })
            .collect()
    }

    #[test]
    fn test_count_trigger_over_reader_thread() {
        let config = AverageConfig {
            window_size: 3,
            ..AverageConfig::default()
        };
        let mut manager = AverageManager::new(&config);
        let (rx, handle) = spawn_reader(MemorySource::new(ensembles(10)));

        let summary = run_averaging(&mut manager, &rx, &ticker(&config));
        assert_eq!(handle.join().unwrap().unwrap(), 10);
        assert_eq!(
            summary,
            RunSummary {
                ensembles: 10,
                published: 3,
                failed: 0
            }
        );
    }

    #[test]
    fn test_failed_average_is_counted() {
        let config = AverageConfig {
            window_size: 2,
            ..AverageConfig::default()
        };
        let mut manager = AverageManager::new(&config);
        let mut input = ensembles(2);
        input[1].amplitude = Some(vec![vec![1.0; 3]]);
        let (rx, _handle) = spawn_reader(MemorySource::new(input));

        let summary = run_averaging(&mut manager, &rx, &never());
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.published, 0);
    }

    #[test]
    fn test_timer_trigger_publishes_between_arrivals() {
        let config = AverageConfig {
            window_size: 5,
            running_average: true,
            trigger: TriggerMode::Timer,
            timer_interval_ms: 5,
            ..AverageConfig::default()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        for ensemble in ensembles(2) {
            tx.send(ensemble).unwrap();
        }

        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        let mut manager = AverageManager::new(&config);
        manager.subscribe(move |e| {
            *sink.lock().unwrap() = e.info.as_ref().map(|i| i.averaged_count);
        });

        let ticks = ticker(&config);
        let worker = thread::spawn(move || run_averaging(&mut manager, &rx, &ticks));
        thread::sleep(Duration::from_millis(60));
        drop(tx);

        let summary = worker.join().unwrap();
        assert_eq!(summary.ensembles, 2);
        assert!(summary.published >= 1);
        assert_eq!(*last.lock().unwrap(), Some(2));
    }
}
