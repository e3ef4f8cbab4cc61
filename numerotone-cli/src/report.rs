//! Text rendering of snapshots for the terminal.

use numerotone_core::counts::DigitShare;
use numerotone_core::{Band, BandReadout, Snapshot};

fn shares(summary: &[DigitShare]) -> String {
    if summary.is_empty() {
        return "-".to_string();
    }
    summary
        .iter()
        .map(|s| format!("{} ({:.0}%)", s.digit, s.percent))
        .collect::<Vec<_>>()
        .join(", ")
}

fn readout_cell(readout: &BandReadout) -> String {
    match (&readout.note_name, readout.digit) {
        (Some(note), Some(digit)) => format!(
            "{note:<4} {:>7.1} Hz {:+4.0}c -> {digit}",
            readout.frequency_hz, readout.cents
        ),
        _ => "-".to_string(),
    }
}

/// One line per poll for live mode.
pub fn status_line(elapsed_seconds: f64, snapshot: &Snapshot) -> String {
    let bands = Band::ALL
        .iter()
        .map(|&b| {
            let readout = &snapshot.band(b).readout;
            match (&readout.note_name, readout.digit) {
                (Some(note), Some(digit)) => format!("{b}:{note}/{digit}"),
                _ => format!("{b}:-"),
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    let lead = snapshot
        .embodiment_summary
        .first()
        .map_or_else(|| "-".to_string(), |s| s.digit.to_string());
    format!(
        "[{elapsed_seconds:>6.1}s] {bands}  | embodiment {lead}  | key {} ({:.0}%)",
        snapshot.key.name(),
        snapshot.key.confidence
    )
}

/// Multi-line summary of a finished analysis.
pub fn full_report(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Frames analyzed: {} at {} Hz (A4 = {} Hz)\n\n",
        snapshot.frames_processed, snapshot.sample_rate, snapshot.a4_hz
    ));
    for band in Band::ALL {
        let b = snapshot.band(band);
        out.push_str(&format!(
            "{:<5} last: {:<32} top: {}\n",
            band.name(),
            readout_cell(&b.readout),
            shares(&b.summary)
        ));
    }
    out.push_str(&format!(
        "\nEmbodiment: {}\n",
        shares(&snapshot.embodiment_summary)
    ));
    out.push_str(&format!(
        "Key: {} ({:.1}%)\n",
        snapshot.key.name(),
        snapshot.key.confidence
    ));
    match &snapshot.main_note {
        Some(note) => out.push_str(&format!(
            "Main note: {} ({:.0}% of recent harmonic frames)\n",
            note.note_name, note.confidence_percent
        )),
        None => out.push_str("Main note: -\n"),
    }
    out
}
