//! Quote trigger patterns.
//!
//! A trigger is a line pattern that may start quoted ancestor content, plus
//! the evidence needed to confirm it. The state machine only ever sees a
//! [`TriggerSet`], so new client conventions are added by registering
//! triggers, never by touching the transitions.

use regex::Regex;

use crate::config::QuotesConfig;
use crate::error::{BookError, Result};

/// What has to follow a trigger line before the quote is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The trigger line alone confirms the quote.
    Immediate,
    /// At least this many quote-marker lines must follow, before any
    /// non-quote line.
    QuoteRun(usize),
    /// Every remaining non-blank line, the trigger line included, must be a
    /// quote-marker line, and there must be at least this many of them.
    TrailingQuote(usize),
}

impl Confirmation {
    /// `QuoteRun(0)` is the same as `Immediate`.
    fn quote_run(min: usize) -> Self {
        if min == 0 {
            Self::Immediate
        } else {
            Self::QuoteRun(min)
        }
    }
}

/// A named line pattern, optionally tied to the line that must come next.
#[derive(Debug, Clone)]
pub struct Trigger {
    name: String,
    pattern: Regex,
    followed_by: Option<Regex>,
    confirmation: Confirmation,
}

impl Trigger {
    /// Compile a trigger. Invalid regexes are reported as [`BookError::InvalidPattern`].
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        confirmation: Confirmation,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| BookError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: name.into(),
            pattern,
            followed_by: None,
            confirmation,
        })
    }

    /// Only fire when the next line matches `pattern` as well.
    pub fn followed_by(mut self, pattern: &str) -> Result<Self> {
        let next = Regex::new(pattern).map_err(|e| BookError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.followed_by = Some(next);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn confirmation(&self) -> Confirmation {
        self.confirmation
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    /// Whether the trigger fires at `lines[i]`, next-line condition included.
    fn fires_at(&self, lines: &[&str], i: usize) -> bool {
        let Some(line) = lines.get(i) else {
            return false;
        };
        if !self.pattern.is_match(line) {
            return false;
        }
        match &self.followed_by {
            Some(next) => lines.get(i + 1).is_some_and(|l| next.is_match(l)),
            None => true,
        }
    }
}

/// A trigger found at some line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriggerHit<'a> {
    pub trigger: &'a Trigger,
    /// Lines covered by the trigger (2 for a header wrapped over two lines).
    pub span: usize,
}

/// Ordered list of triggers. The first matching trigger wins.
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
}

/// (name, pattern, needs the configured quote run)
const REPLY_HEADERS: &[(&str, &str)] = &[
    ("reply-header", r"(?i)^\s*On\s.+\bwrote:\s*$"),
    ("reply-header-address", r"(?i)^\s*\S.{0,100}<[^<>\s]+@[^<>\s]+>\s+wrote:\s*$"),
    ("reply-header-fr", r"(?i)^\s*Le\s.+\sa\s+écrit\s*:\s*$"),
    ("reply-header-de", r"(?i)^\s*Am\s.+\sschrieb\s.*:\s*$"),
    ("reply-header-es", r"(?i)^\s*El\s.+\sescribió\s*:\s*$"),
    ("reply-header-pt", r"(?i)^\s*(Em|No dia)\s.+\sescreveu\s*:\s*$"),
    ("reply-header-it", r"(?i)^\s*Il\s.+\sha\s+scritto\s*:\s*$"),
];

const SEPARATORS: &[(&str, &str)] = &[
    ("original-message", r"(?i)^\s*-{2,}\s*Original Message\s*-{2,}\s*$"),
    ("outlook-reply", r"(?i)^\s*-{2,}\s*Reply message\s*-{2,}\s*$"),
    ("html-blockquote", r"(?i)^\s*<blockquote\b"),
];

const OUTLOOK_FROM: &str = r"(?i)^\s*\*?From:\*?\s+\S";

/// Outlook header blocks: (name, line pattern, pattern the next line must match).
const HEADER_BLOCKS: &[(&str, &str, &str)] = &[
    ("outlook-rule", r"^\s*_{4,}\s*$", OUTLOOK_FROM),
    (
        "outlook-header",
        OUTLOOK_FROM,
        r"(?i)^\s*\*?(Sent|Date):\*?\s+\S",
    ),
];

impl TriggerSet {
    /// A set with no triggers; stripping with it never changes a body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in reply headers, client separators and the trailing quote block.
    pub fn builtin(min_quote_run: usize) -> Self {
        let mut set = Self::empty();
        for (name, pattern) in REPLY_HEADERS {
            set.push_builtin(name, pattern, Confirmation::quote_run(min_quote_run));
        }
        for (name, pattern) in SEPARATORS {
            set.push_builtin(name, pattern, Confirmation::Immediate);
        }
        for (name, pattern, next) in HEADER_BLOCKS {
            match Trigger::new(*name, pattern, Confirmation::Immediate)
                .and_then(|t| t.followed_by(next))
            {
                Ok(trigger) => set.triggers.push(trigger),
                Err(e) => tracing::error!("{e}"),
            }
        }
        set.push_builtin(
            "quote-block",
            r"^\s*>",
            Confirmation::TrailingQuote(min_quote_run.max(1)),
        );
        set
    }

    /// Built-ins followed by the patterns from the `[quotes]` section.
    pub fn from_config(config: &QuotesConfig) -> Result<Self> {
        let mut set = Self::builtin(config.min_quote_run);
        for (i, extra) in config.patterns.iter().enumerate() {
            let min = extra.min_quote_run.unwrap_or(config.min_quote_run);
            set.register(Trigger::new(
                format!("custom-{}", i + 1),
                &extra.regex,
                Confirmation::quote_run(min),
            )?);
        }
        Ok(set)
    }

    /// Append a trigger. It is tried after every trigger already registered.
    pub fn register(&mut self, trigger: Trigger) {
        tracing::debug!(name = trigger.name(), "Registered quote trigger");
        self.triggers.push(trigger);
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    fn push_builtin(&mut self, name: &str, pattern: &str, confirmation: Confirmation) {
        match Trigger::new(name, pattern, confirmation) {
            Ok(trigger) => self.triggers.push(trigger),
            Err(e) => tracing::error!("{e}"),
        }
    }

    fn firing(&self, lines: &[&str], i: usize) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.fires_at(lines, i))
    }

    /// Single-line triggers matching `line`; used for wrapped headers.
    fn matching(&self, line: &str) -> Option<&Trigger> {
        self.triggers
            .iter()
            .find(|t| t.followed_by.is_none() && t.is_match(line))
    }

    /// The trigger starting at `lines[i]`, if any.
    ///
    /// A header wrapped over two lines (`On …, Jane <jane@` / `example.com> wrote:`)
    /// is matched by joining line `i` with line `i + 1`, but only when neither
    /// line matches on its own.
    pub(crate) fn hit_at<'a>(&'a self, lines: &[&str], i: usize) -> Option<TriggerHit<'a>> {
        let line = lines.get(i)?;
        if let Some(trigger) = self.firing(lines, i) {
            return Some(TriggerHit { trigger, span: 1 });
        }

        let next = lines.get(i + 1)?;
        if line.trim().is_empty() || next.trim().is_empty() || self.firing(lines, i + 1).is_some()
        {
            return None;
        }
        let joined = format!("{} {}", line.trim_end(), next.trim_start());
        self.matching(&joined)
            .map(|trigger| TriggerHit { trigger, span: 2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;

    fn first_match<'a>(set: &'a TriggerSet, line: &str) -> Option<&'a str> {
        set.hit_at(&[line], 0).map(|hit| hit.trigger.name())
    }

    #[test]
    fn test_builtin_reply_headers() {
        let set = TriggerSet::builtin(2);
        assert_eq!(
            first_match(&set, "On Jan 1, 2020, Jane wrote:"),
            Some("reply-header")
        );
        assert_eq!(
            first_match(&set, "Jane Doe <jane@example.com> wrote:"),
            Some("reply-header-address")
        );
        assert_eq!(
            first_match(&set, "Le 3 mars 2021 à 10:00, Marie a écrit :"),
            Some("reply-header-fr")
        );
        assert_eq!(
            first_match(&set, "Em 12/05/2019, João escreveu:"),
            Some("reply-header-pt")
        );
        assert_eq!(first_match(&set, "I wrote: a letter"), None);
        assert_eq!(first_match(&set, "Jane wrote:"), None);
    }

    #[test]
    fn test_separators_confirm_immediately() {
        let set = TriggerSet::builtin(2);
        let hit = set.hit_at(&["-----Original Message-----"], 0).unwrap();
        assert_eq!(hit.trigger.confirmation(), Confirmation::Immediate);
        let hit = set.hit_at(&["<blockquote type=\"cite\">"], 0).unwrap();
        assert_eq!(hit.trigger.name(), "html-blockquote");
    }

    #[test]
    fn test_outlook_block_needs_sent_line() {
        let set = TriggerSet::builtin(2);
        let block = ["From: Bob Smith", "Sent: Monday, January 6, 2020", "To: Jane"];
        let hit = set.hit_at(&block, 0).unwrap();
        assert_eq!(hit.trigger.name(), "outlook-header");
        assert_eq!(hit.trigger.confirmation(), Confirmation::Immediate);

        assert!(set.hit_at(&["From: Bob Smith", "To: Jane"], 0).is_none());
        assert!(set.hit_at(&["From: Bob Smith"], 0).is_none());
        assert_eq!(
            set.hit_at(&["_____", "From: Bob"], 0).map(|h| h.trigger.name()),
            Some("outlook-rule")
        );
    }

    #[test]
    fn test_followed_by_rejects_bad_pattern() {
        let err = Trigger::new("x", "^From:", Confirmation::Immediate)
            .unwrap()
            .followed_by("(")
            .unwrap_err();
        assert!(matches!(err, BookError::InvalidPattern { .. }));
    }

    #[test]
    fn test_wrapped_header_spans_two_lines() {
        let set = TriggerSet::builtin(2);
        let lines = ["On Mon, Jan 6, 2020 at 9:14 AM Jane Doe <jane@", "example.com> wrote:"];
        let hit = set.hit_at(&lines, 0).unwrap();
        assert_eq!(hit.span, 2);
        assert_eq!(hit.trigger.name(), "reply-header");
    }

    #[test]
    fn test_wrapped_header_not_joined_onto_previous_line() {
        let set = TriggerSet::builtin(2);
        let lines = ["Thanks!", "On Jan 1, 2020, Jane wrote:"];
        assert!(set.hit_at(&lines, 0).is_none());
        assert_eq!(set.hit_at(&lines, 1).unwrap().span, 1);
    }

    #[test]
    fn test_from_config_appends_custom_patterns() {
        let config = QuotesConfig {
            min_quote_run: 3,
            patterns: vec![PatternConfig {
                regex: "^Von: .+".into(),
                min_quote_run: Some(0),
            }],
        };
        let set = TriggerSet::from_config(&config).unwrap();
        assert_eq!(set.len(), TriggerSet::builtin(3).len() + 1);
        let hit = set.hit_at(&["Von: Hans"], 0).unwrap();
        assert_eq!(hit.trigger.name(), "custom-1");
        assert_eq!(hit.trigger.confirmation(), Confirmation::Immediate);
    }

    #[test]
    fn test_invalid_custom_pattern_is_rejected() {
        let config = QuotesConfig {
            min_quote_run: 2,
            patterns: vec![PatternConfig {
                regex: "([unclosed".into(),
                min_quote_run: None,
            }],
        };
        let err = TriggerSet::from_config(&config).unwrap_err();
        assert!(matches!(err, BookError::InvalidPattern { .. }));
    }
}
