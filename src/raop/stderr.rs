//! Pure parsing of the helper's stderr state-transition patterns, spec §4.4.
//! Kept separate from the process-owning driver so the state machine is
//! testable without spawning anything.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Playing { reset_elapsed: bool },
    Paused,
    ElapsedUpdate(u64),
    None,
}

pub fn classify_line(line: &str) -> Transition {
    if line.contains("restarting w/o pause") {
        Transition::Playing { reset_elapsed: true }
    } else if line.contains("set pause") {
        Transition::Paused
    } else if line.contains("Restarted at") {
        Transition::Playing { reset_elapsed: false }
    } else if line.contains("after start), played") {
        match parse_played_ms(line) {
            Some(ms) => Transition::ElapsedUpdate(ms),
            None => Transition::None,
        }
    } else {
        Transition::None
    }
}

fn parse_played_ms(line: &str) -> Option<u64> {
    let tail = line.split("played").nth(1)?;
    let digits: String = tail
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restarting_without_pause_resets_elapsed() {
        assert_eq!(
            classify_line("2026-07-26 restarting w/o pause, seq=42"),
            Transition::Playing { reset_elapsed: true }
        );
    }

    #[test]
    fn set_pause_transitions_to_paused() {
        assert_eq!(classify_line("player set pause"), Transition::Paused);
    }

    #[test]
    fn restarted_at_resumes_without_resetting_elapsed() {
        assert_eq!(
            classify_line("Restarted at 1234567"),
            Transition::Playing { reset_elapsed: false }
        );
    }

    #[test]
    fn played_line_extracts_millisecond_count() {
        assert_eq!(
            classify_line("(123ms after start), played 4567 ms"),
            Transition::ElapsedUpdate(4567)
        );
    }

    #[test]
    fn unrecognised_line_is_none() {
        assert_eq!(classify_line("some unrelated diagnostic"), Transition::None);
    }
}
