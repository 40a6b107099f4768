use std::io::Write;

use serde::{Deserialize, Serialize};

/// Flat emission record of one ranked binding mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeReport {
    /// 1-based position in the complex energy ranking.
    pub rank: usize,
    pub n_poses: usize,

    /// Chromosome index of the elected representative.
    pub representative_index: usize,
    pub representative_energy: f64,
    pub representative_features: Vec<f32>,

    /// Member chromosome indices in classification order.
    pub member_indices: Vec<usize>,
    /// Best member under the pose ranking order (solvated energy first).
    pub best_member_index: usize,

    pub complex_dg: f64,
    pub complex_dh: f64,
    pub complex_ds: f64,

    pub free_ligand_dg: f64,
    pub free_ligand_dh: f64,
    pub free_ligand_ds: f64,

    pub solvated_dg: f64,
    pub solvated_dh: f64,
    pub solvated_ds: f64,
}

/// One row of the density-peak diagnostic table. Informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityDiagnostic {
    /// Chromosome index of the pose.
    pub index: usize,
    /// Number of other poses within the cutoff radius.
    pub density: usize,
    /// Distance to the nearest higher-density pose.
    pub delta: f32,
    /// Temperature-weighted energy of the pose.
    pub energy: f64,
    /// Chromosome index of the nearest higher-density pose, -1 for a
    /// global density maximum.
    pub nearest_center: i64,
    /// Combined score `density * delta` used for center ranking.
    pub gamma: f32,
}

/// Capability handed to the population for emitting ranked results.
/// File formats and destinations are the collaborator's concern.
pub trait ResultWriter {
    fn write_mode(&mut self, report: &ModeReport) -> Result<(), Box<dyn std::error::Error>>;

    fn write_diagnostics(
        &mut self,
        _rows: &[DensityDiagnostic],
    ) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}

/// Line-oriented JSON writer over any `Write` sink.
pub struct JsonLinesWriter<W: Write> {
    sink: W,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(sink: W) -> Self {
        JsonLinesWriter { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> ResultWriter for JsonLinesWriter<W> {
    fn write_mode(&mut self, report: &ModeReport) -> Result<(), Box<dyn std::error::Error>> {
        serde_json::to_writer(&mut self.sink, report)?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }

    fn write_diagnostics(
        &mut self,
        rows: &[DensityDiagnostic],
    ) -> Result<(), Box<dyn std::error::Error>> {
        for row in rows {
            serde_json::to_writer(&mut self.sink, row)?;
            self.sink.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Writer that keeps everything in memory; used by tests and callers
/// that post-process results themselves.
#[derive(Debug, Default)]
pub struct CollectingWriter {
    pub modes: Vec<ModeReport>,
    pub diagnostics: Vec<DensityDiagnostic>,
}

impl ResultWriter for CollectingWriter {
    fn write_mode(&mut self, report: &ModeReport) -> Result<(), Box<dyn std::error::Error>> {
        self.modes.push(report.clone());
        Ok(())
    }

    fn write_diagnostics(
        &mut self,
        rows: &[DensityDiagnostic],
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.diagnostics.extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(rank: usize) -> ModeReport {
        ModeReport {
            rank,
            n_poses: 2,
            representative_index: 0,
            representative_energy: -7.5,
            representative_features: vec![0.0, 1.0],
            member_indices: vec![0, 3],
            best_member_index: 3,
            complex_dg: -8.0,
            complex_dh: -7.0,
            complex_ds: 0.01,
            free_ligand_dg: -1.0,
            free_ligand_dh: -7.0,
            free_ligand_ds: -0.02,
            solvated_dg: -6.0,
            solvated_dh: -5.0,
            solvated_ds: 0.003,
        }
    }

    #[test]
    fn test_json_lines_writer_emits_one_line_per_mode() {
        let mut writer = JsonLinesWriter::new(Vec::new());
        writer.write_mode(&report(1)).unwrap();
        writer.write_mode(&report(2)).unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        let parsed: ModeReport = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.rank, 1);
        assert_eq!(parsed.member_indices, vec![0, 3]);
    }

    #[test]
    fn test_collecting_writer_keeps_order() {
        let mut writer = CollectingWriter::default();
        writer.write_mode(&report(1)).unwrap();
        writer.write_mode(&report(2)).unwrap();
        assert_eq!(writer.modes.len(), 2);
        assert_eq!(writer.modes[1].rank, 2);
    }
}
