use once_cell::sync::Lazy;
use regex::Regex;

static DOWNLOAD_PROGRESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[download\]\s+(?P<progress>\d{1,3}(?:\.\d)?)%").unwrap());

/// Markers yt-dlp prints when a post-processing step starts. These steps
/// report no percentage of their own.
const POSTPROCESSING_MARKERS: &[&str] =
    &["[Merger]", "[ExtractAudio]", "[VideoConvertor]", "[VideoRemuxer]"];

/// Extracts the raw percentage from one line of extractor output, if the
/// line is a download-progress announcement. Absence of a match is the only
/// failure mode.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    DOWNLOAD_PROGRESS_REGEX
        .captures(line)
        .and_then(|caps| caps.name("progress"))
        .and_then(|m| m.as_str().parse().ok())
}

/// True when the line announces a merge, audio-extraction, or transcode
/// step is in progress.
pub fn is_postprocessing_line(line: &str) -> bool {
    POSTPROCESSING_MARKERS.iter().any(|m| line.contains(m))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Video,
    Audio,
}

/// Folds the extractor's per-stream raw percentages into one overall 0-100
/// figure.
///
/// yt-dlp reports each sub-download (video stream, then audio stream) as an
/// independent 0->100 sequence without announcing the switch, so the move to
/// the audio phase is inferred from the first raw value that is lower than
/// its predecessor. If no reset is ever observed the mapper stays in phase 1;
/// the overall value is advisory only, so that is accepted.
#[derive(Debug)]
pub struct PhaseProgress {
    audio_only: bool,
    phase: Phase,
    last_raw: f64,
}

impl PhaseProgress {
    pub fn new(audio_only: bool) -> Self {
        PhaseProgress {
            audio_only,
            phase: Phase::Video,
            last_raw: 0.0,
        }
    }

    /// Observes one raw percentage and returns the mapped overall progress.
    ///
    /// Audio-only jobs scale to 90% (the last 10% is the extraction step).
    /// Video+audio jobs give each stream 45%, again reserving 10% for the
    /// merge. Once the phase has advanced it never reverts.
    pub fn observe(&mut self, raw: f64) -> f64 {
        if self.audio_only {
            self.last_raw = raw;
            return raw * 0.9;
        }
        if self.phase == Phase::Video && raw < self.last_raw {
            self.phase = Phase::Audio;
        }
        self.last_raw = raw;
        match self.phase {
            Phase::Video => raw * 0.45,
            Phase::Audio => 45.0 + raw * 0.45,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_percentages() {
        assert_eq!(
            parse_progress_line("[download]  45% of 10.00MiB at 1.00MiB/s ETA 00:05"),
            Some(45.0)
        );
        assert_eq!(
            parse_progress_line("[download]  45.2% of ~10.00MiB at 1.00MiB/s"),
            Some(45.2)
        );
        assert_eq!(parse_progress_line("[download] 100% of 10.00MiB"), Some(100.0));
    }

    #[test]
    fn ignores_non_progress_lines() {
        assert_eq!(parse_progress_line(""), None);
        assert_eq!(parse_progress_line("[info] Downloading webpage"), None);
        assert_eq!(
            parse_progress_line("[download] Destination: /tmp/abc.mp4"),
            None
        );
        assert_eq!(parse_progress_line("garbage % [download]"), None);
    }

    #[test]
    fn detects_postprocessing_markers() {
        assert!(is_postprocessing_line(
            "[Merger] Merging formats into \"/tmp/abc.mp4\""
        ));
        assert!(is_postprocessing_line("[ExtractAudio] Destination: /tmp/abc.mp3"));
        assert!(is_postprocessing_line("[VideoConvertor] Converting video"));
        assert!(!is_postprocessing_line("[download]  45% of 10MiB"));
    }

    #[test]
    fn audio_only_scales_to_ninety() {
        let mut mapper = PhaseProgress::new(true);
        let mapped: Vec<f64> = [0.0, 10.0, 50.0, 100.0]
            .iter()
            .map(|&raw| mapper.observe(raw))
            .collect();
        assert_eq!(mapped, vec![0.0, 9.0, 45.0, 90.0]);
    }

    #[test]
    fn video_audio_phases_split_at_reset() {
        let mut mapper = PhaseProgress::new(false);
        let mapped: Vec<f64> = [20.0, 60.0, 100.0, 15.0, 70.0, 100.0]
            .iter()
            .map(|&raw| mapper.observe(raw))
            .collect();
        assert_eq!(mapped, vec![9.0, 27.0, 45.0, 51.75, 76.5, 90.0]);
    }

    #[test]
    fn phase_never_reverts_after_advancing() {
        let mut mapper = PhaseProgress::new(false);
        mapper.observe(80.0);
        mapper.observe(10.0); // phase 2
        mapper.observe(5.0); // another dip stays in phase 2
        assert_eq!(mapper.observe(50.0), 45.0 + 22.5);
    }

    #[test]
    fn without_reset_phase_one_is_kept() {
        let mut mapper = PhaseProgress::new(false);
        for raw in [10.0, 50.0, 100.0] {
            mapper.observe(raw);
        }
        assert_eq!(mapper.observe(100.0), 45.0);
    }
}
