use super::{Formatter, cell};
use crate::ensemble::Ensemble;

/// One row per bin of earth velocity; sentinel cells are left empty
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, ensemble: &Ensemble) -> String {
        let Some(velocity) = ensemble.earth_velocity.as_ref() else {
            return String::new();
        };
        let (number, averaged, first, last) = ensemble.info.as_ref().map_or(
            (String::new(), String::new(), String::new(), String::new()),
            |i| {
                (
                    i.ensemble_number.to_string(),
                    i.averaged_count.to_string(),
                    format!("{:.3}", i.first_ping_time),
                    format!("{:.3}", i.last_ping_time),
                )
            },
        );

        velocity
            .iter()
            .enumerate()
            .map(|(bin, row)| {
                let component = |c: usize| row.get(c).copied().map_or(String::new(), cell);
                format!(
                    "{},{},{},{},{},{},{},{},{}",
                    number,
                    averaged,
                    first,
                    last,
                    bin,
                    component(0),
                    component(1),
                    component(2),
                    component(3)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn header(&self) -> Option<&'static str> {
        Some("ensemble,averaged_count,first_ping_time,last_ping_time,bin,east,north,vertical,error")
    }
}
