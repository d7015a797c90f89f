use super::{Formatter, cell, iso8601_timestamp};
use crate::ensemble::Ensemble;

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, ensemble: &Ensemble) -> String {
        let Some(info) = ensemble.info.as_ref() else {
            return "Ensemble: (no info)".to_string();
        };

        let mut out = format!(
            "Ensemble {:>6}: {:>3} averaged, pings {}/{}, {:.2}s - {:.2}s",
            info.ensemble_number,
            info.averaged_count,
            info.actual_ping_count,
            info.desired_ping_count,
            info.first_ping_time,
            info.last_ping_time
        );
        if let Some(at) = info.averaged_at.as_ref() {
            out.push_str(&format!(" @ {}", iso8601_timestamp(at)));
        }

        if self.verbose {
            if let Some(velocity) = ensemble.earth_velocity.as_ref() {
                for (bin, row) in velocity.iter().enumerate() {
                    let values: Vec<String> =
                        row.iter().map(|&v| format!("{:>8}", cell(v))).collect();
                    out.push_str(&format!("\n  bin {:>3}: {}", bin, values.join(" ")));
                }
            }
        }

        out
    }
}
