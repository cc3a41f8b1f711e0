//! The quote-stripping state machine.

use super::triggers::{Confirmation, TriggerSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Original content.
    Body,
    /// A trigger matched at `start`; waiting for quote-marker lines.
    QuoteCandidate {
        start: usize,
        confirmation: Confirmation,
        run: usize,
    },
    /// Confirmed. Sticky: everything from `start` on is discarded.
    InQuote { start: usize },
    /// Input exhausted. Holds the cut line, if any.
    End { cut: Option<usize> },
}

/// Result of stripping one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripOutcome {
    /// The body with quoted content removed.
    pub body: String,
    /// Whether anything was removed.
    pub stripped: bool,
    /// Name of the trigger that confirmed the first cut.
    pub trigger: Option<String>,
}

/// Remove quoted ancestor content from `body`.
///
/// The machine is re-run on its own output until nothing changes, so
/// `strip(strip(b)) == strip(b)` holds for any trigger set. A body with no
/// confirmed quote is returned unchanged, byte for byte.
pub fn strip(body: &str, triggers: &TriggerSet) -> StripOutcome {
    let mut current = body.to_string();
    let mut trigger = None;

    loop {
        let lines: Vec<&str> = current.lines().collect();
        let Some((cut, name)) = find_cut(&lines, triggers) else {
            break;
        };
        let next = join_trimmed(&lines[..cut]);
        if next == current {
            break;
        }
        trigger.get_or_insert(name);
        current = next;
    }

    StripOutcome {
        stripped: trigger.is_some(),
        body: current,
        trigger,
    }
}

/// Run the machine over `lines` and return the first discarded line.
fn find_cut(lines: &[&str], triggers: &TriggerSet) -> Option<(usize, String)> {
    let mut state = State::Body;
    let mut trigger_name = String::new();
    let mut i = 0;

    loop {
        state = match (state, lines.get(i)) {
            (State::End { cut }, _) => return cut.map(|c| (c, trigger_name)),

            (State::InQuote { start }, _) => State::End { cut: Some(start) },

            (State::Body, None) => State::End { cut: None },

            (State::Body, Some(line)) => match triggers.hit_at(lines, i) {
                Some(hit) => {
                    trigger_name = hit.trigger.name().to_string();
                    let start = i;
                    i += hit.span;
                    match hit.trigger.confirmation() {
                        Confirmation::Immediate => State::InQuote { start },
                        confirmation => State::QuoteCandidate {
                            start,
                            confirmation,
                            run: usize::from(is_quote_line(line)),
                        },
                    }
                }
                None => {
                    i += 1;
                    State::Body
                }
            },

            (
                State::QuoteCandidate {
                    start,
                    confirmation,
                    run,
                },
                None,
            ) => match confirmation {
                Confirmation::TrailingQuote(min) if run >= min => State::InQuote { start },
                _ => {
                    i = resume_point(lines, triggers, start, i);
                    State::Body
                }
            },

            (
                State::QuoteCandidate {
                    start,
                    confirmation,
                    run,
                },
                Some(line),
            ) => {
                if is_blank(line) {
                    i += 1;
                    state
                } else if is_quote_line(line) {
                    i += 1;
                    let run = run + 1;
                    match confirmation {
                        Confirmation::QuoteRun(min) if run >= min => State::InQuote { start },
                        _ => State::QuoteCandidate {
                            start,
                            confirmation,
                            run,
                        },
                    }
                } else {
                    // Not a quote after all
                    i = resume_point(lines, triggers, start, i);
                    State::Body
                }
            }
        };
    }
}

/// Where scanning goes on after the candidate at `start` failed at `stop`.
///
/// Lines in between are blank or quote lines, so any conditional candidate
/// starting there fails at `stop` too. Only an immediate trigger among them
/// can still cut, and scanning resumes at the first one.
fn resume_point(lines: &[&str], triggers: &TriggerSet, start: usize, stop: usize) -> usize {
    (start + 1..stop)
        .find(|&j| {
            triggers
                .hit_at(lines, j)
                .is_some_and(|hit| hit.trigger.confirmation() == Confirmation::Immediate)
        })
        .unwrap_or(stop)
}

/// A line carrying the `>` quote marker.
pub fn is_quote_line(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Join lines with `\n`, dropping trailing blank lines.
fn join_trimmed(lines: &[&str]) -> String {
    let end = lines.iter().rposition(|l| !is_blank(l)).map_or(0, |e| e + 1);
    lines[..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::Trigger;
    use proptest::prelude::*;

    fn builtin() -> TriggerSet {
        TriggerSet::builtin(2)
    }

    #[test]
    fn test_reply_header_with_quote_run_is_cut() {
        let body = "Sounds great, see you there.\n\nOn Jan 1, 2020, Jane wrote:\n> Are we\n> still on\n> for Friday?";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, "Sounds great, see you there.");
        assert!(outcome.stripped);
        assert_eq!(outcome.trigger.as_deref(), Some("reply-header"));
    }

    #[test]
    fn test_body_without_markers_is_unchanged() {
        let body = "Dear Bob,\n\nThe garden is lovely this year.\n\n\nLove,\nJane\n";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, body);
        assert!(!outcome.stripped);
        assert_eq!(outcome.trigger, None);
    }

    #[test]
    fn test_header_without_quote_run_is_kept() {
        let body = "On Jan 1, 2020, Jane wrote:\nwhat a day it was.\n> one line";
        assert_eq!(strip(body, &builtin()).body, body);
    }

    #[test]
    fn test_blank_lines_inside_run_are_neutral() {
        let body = "Yes!\nOn Jan 1, 2020, Jane wrote:\n\n> Are you\n\n> coming?";
        assert_eq!(strip(body, &builtin()).body, "Yes!");
    }

    #[test]
    fn test_in_quote_is_sticky() {
        let body = "Top\nOn Jan 1, 2020, Jane wrote:\n> a\n> b\nunquoted tail\nmore tail";
        assert_eq!(strip(body, &builtin()).body, "Top");
    }

    #[test]
    fn test_original_message_separator() {
        let body = "Got it.\n\n-----Original Message-----\nFrom: Bob\nSent: Monday";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, "Got it.");
        assert_eq!(outcome.trigger.as_deref(), Some("original-message"));
    }

    #[test]
    fn test_wrapped_gmail_header() {
        let body = "Sure.\n\nOn Mon, Jan 6, 2020 at 9:14 AM Jane Doe <jane@\nexample.com> wrote:\n\n> lunch?\n> at noon?";
        assert_eq!(strip(body, &builtin()).body, "Sure.");
    }

    #[test]
    fn test_trailing_quote_block_without_header() {
        let body = "Agreed.\n\n> first\n> second";
        assert_eq!(strip(body, &builtin()).body, "Agreed.");
    }

    #[test]
    fn test_interleaved_quotes_are_kept() {
        let body = "> Are you coming?\n> And Bob?\nYes, both of us.\n> What time?\nAround six.";
        assert_eq!(strip(body, &builtin()).body, body);
    }

    #[test]
    fn test_minimum_run_is_configurable() {
        let body = "Ok\nOn Jan 1, 2020, Jane wrote:\n> a\n> b";
        assert_eq!(strip(body, &TriggerSet::builtin(3)).body, body);
        assert_eq!(strip(body, &TriggerSet::builtin(2)).body, "Ok");
    }

    #[test]
    fn test_registered_trigger_extends_detection() {
        let body = "Fine.\nVon: Hans\nGesendet: Montag";
        assert_eq!(strip(body, &builtin()).body, body);

        let mut set = builtin();
        set.register(
            Trigger::new("german-outlook", r"^Von: ", Confirmation::Immediate).unwrap(),
        );
        assert_eq!(strip(body, &set).body, "Fine.");
    }

    #[test]
    fn test_whole_body_quoted() {
        let body = "On Jan 1, 2020, Jane wrote:\n> a\n> b";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, "");
        assert!(outcome.stripped);
    }

    #[test]
    fn test_outlook_header_block() {
        let body = "Thanks, see you then.\n\n____\nFrom: Bob Smith\nSent: Monday, January 6, 2020 9:14 AM\nTo: Jane\nSubject: Lunch\n\nAre we still on for Friday?";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, "Thanks, see you then.");
        assert_eq!(outcome.trigger.as_deref(), Some("outlook-rule"));

        let body = "Sure.\n\n*From:* Bob Smith\n*Date:* Mon, 6 Jan 2020\n*Subject:* Lunch\n\nNoon?";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, "Sure.");
        assert_eq!(outcome.trigger.as_deref(), Some("outlook-header"));
    }

    #[test]
    fn test_lone_from_line_is_kept() {
        let body = "From: the garden, with love\nWe picked the last tomatoes.";
        assert_eq!(strip(body, &builtin()).body, body);
        let body = "Notes\n____\nnothing below";
        assert_eq!(strip(body, &builtin()).body, body);
    }

    #[test]
    fn test_failed_candidate_still_finds_later_separator() {
        let body = "Reply\nOn Jan 1, 2020, Jane wrote:\n> a\n-----Original Message-----\nolder";
        let outcome = strip(body, &builtin());
        assert_eq!(outcome.body, "Reply\nOn Jan 1, 2020, Jane wrote:\n> a");
        assert_eq!(outcome.trigger.as_deref(), Some("original-message"));
    }

    #[test]
    fn test_immediate_trigger_inside_failed_run() {
        let mut set = TriggerSet::empty();
        set.register(
            Trigger::new("header", r"^On .+ wrote:$", Confirmation::QuoteRun(2)).unwrap(),
        );
        set.register(Trigger::new("cut-here", r"^> cut here$", Confirmation::Immediate).unwrap());
        let body = "Top\nOn Jan 1, 2020, Jane wrote:\n> cut here\nnot quoted";
        assert_eq!(strip(body, &set).body, "Top\nOn Jan 1, 2020, Jane wrote:");
    }

    #[test]
    fn test_long_quote_run_followed_by_reply() {
        let mut body = "> quoted\n".repeat(5_000);
        body.push_str("my reply");
        let outcome = strip(&body, &builtin());
        assert!(!outcome.stripped);
        assert_eq!(outcome.body, body);
    }

    #[test]
    fn test_empty_trigger_set_never_strips() {
        let body = "x\n-----Original Message-----\n> a\n> b";
        assert_eq!(strip(body, &TriggerSet::empty()).body, body);
    }

    const LINES: &[&str] = &[
        "hello there",
        "",
        "> quoted",
        ">> nested",
        "On Jan 1, 2020, Jane wrote:",
        "On Mon, Jan 6, 2020 at 9:14 AM Jane <jane@",
        "example.com> wrote:",
        "-----Original Message-----",
        "Jane Doe <jane@example.com> wrote:",
        "  indented text",
    ];

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 2048,
            ..ProptestConfig::default()
        })]

        #[test]
        fn strip_is_idempotent(
            picks in proptest::collection::vec(0..LINES.len(), 0..24),
            min_run in 1usize..4,
        ) {
            let body = picks.iter().map(|&i| LINES[i]).collect::<Vec<_>>().join("\n");
            let triggers = TriggerSet::builtin(min_run);
            let once = strip(&body, &triggers);
            let twice = strip(&once.body, &triggers);
            prop_assert_eq!(&twice.body, &once.body);
            prop_assert!(!twice.stripped);
        }
    }
}
