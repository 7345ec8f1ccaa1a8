// SPDX-License-Identifier: GPL-3.0-only

//! Repair cost aggregation
//!
//! The bill is derived from the four station results and the brake wear
//! rate every time either changes. It is never updated incrementally.

use crate::backends::analysis::DefectCounts;
use crate::constants::pricing;
use crate::station::{StationId, StationMap};
use std::fmt;

/// One priced line of the bill
#[derive(Debug, Clone, PartialEq)]
pub struct BillLine {
    pub label: String,
    pub amount: f64,
}

/// Repair bill for the current service session
#[derive(Debug, Clone, PartialEq)]
pub struct Bill {
    pub lines: Vec<BillLine>,
    pub total: f64,
}

/// Body work charge for one station's defects
pub fn station_cost(counts: &DefectCounts) -> f64 {
    counts.scratches as f64 * pricing::SCRATCH_RATE + counts.dents as f64 * pricing::DENT_RATE
}

impl Bill {
    /// Price the current results
    ///
    /// Stations without a result contribute nothing. Cracks are reported but
    /// not charged.
    pub fn compute(results: &StationMap<Option<DefectCounts>>, brake_wear_rate: f64) -> Self {
        let mut lines: Vec<BillLine> = results
            .iter()
            .map(|(station, counts)| BillLine {
                label: station_label(station, counts.as_ref()),
                amount: counts.as_ref().map(station_cost).unwrap_or(0.0),
            })
            .collect();

        lines.push(BillLine {
            label: format!("Brake wear ({:.1} x {})", brake_wear_rate, pricing::BRAKE_WEAR_MULTIPLIER),
            amount: brake_wear_rate * pricing::BRAKE_WEAR_MULTIPLIER,
        });
        lines.push(BillLine {
            label: "Diagnostic fee".to_string(),
            amount: pricing::DIAGNOSTIC_FEE,
        });

        let total = lines.iter().map(|line| line.amount).sum();
        Self { lines, total }
    }
}

impl Default for Bill {
    /// Bill with no inspection results and no brake wear
    fn default() -> Self {
        Self::compute(&StationMap::default(), 0.0)
    }
}

fn station_label(station: StationId, counts: Option<&DefectCounts>) -> String {
    match counts {
        Some(c) => format!(
            "{} ({} scratches, {} dents)",
            station.display_name(),
            c.scratches,
            c.dents
        ),
        None => format!("{} (not inspected)", station.display_name()),
    }
}

impl fmt::Display for Bill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WIDTH: usize = 44;
        writeln!(f, "{:-<WIDTH$}", "")?;
        writeln!(f, "{:^WIDTH$}", "SERVICE BAY RECEIPT")?;
        writeln!(f, "{:-<WIDTH$}", "")?;
        for line in &self.lines {
            writeln!(f, "{:<34}{:>10.2}", line.label, line.amount)?;
        }
        writeln!(f, "{:-<WIDTH$}", "")?;
        write!(f, "{:<34}{:>10.2}", "TOTAL", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bill_is_fee_only() {
        let bill = Bill::compute(&StationMap::default(), 0.0);
        assert_eq!(bill.total, pricing::DIAGNOSTIC_FEE);
        assert_eq!(bill.lines.len(), 6);
    }

    #[test]
    fn test_cracks_not_charged() {
        let counts = DefectCounts {
            scratches: 0,
            dents: 0,
            cracks: 5,
        };
        assert_eq!(station_cost(&counts), 0.0);
    }

    #[test]
    fn test_receipt_shows_total() {
        let bill = Bill::compute(&StationMap::default(), 10.0);
        let receipt = bill.to_string();
        assert!(receipt.contains("Diagnostic fee"));
        assert!(receipt.ends_with("700.00"));
    }
}
