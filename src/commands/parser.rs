//! Extracts command invocations from comment bodies.

use regex::Regex;

use crate::github::GitHubError;

/// Line prefixes that address the bot without mentioning it.
pub const RAW_PREFIXES: [&str; 2] = ["!butler", "bot>"];

const QUOTE_MARKER: char = '>';
const COURTESY_WORDS: [&str; 2] = ["please", "run"];

/// One `(command, arguments)` pair parsed from a mention line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command name as written; the registry lower-cases it for lookup.
    pub command: String,
    /// Everything after the first whitespace run, if anything.
    pub arguments: Option<String>,
}

impl Invocation {
    /// Builds an invocation.
    #[must_use]
    pub fn new(command: impl Into<String>, arguments: Option<&str>) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.map(str::to_owned),
        }
    }
}

/// Parses mentions of one bot name.
#[derive(Debug, Clone)]
pub struct MentionParser {
    pattern: Regex,
}

impl MentionParser {
    /// Builds a parser matching `@name`, `name`, and `name[bot]`
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] for an empty bot name.
    pub fn new(bot_name: &str) -> Result<Self, GitHubError> {
        let name = bot_name.trim().trim_start_matches('@');
        if name.is_empty() {
            return Err(GitHubError::Configuration {
                message: "bot name must not be empty".to_owned(),
            });
        }
        let pattern = Regex::new(&format!(r"(?i)@?{}(?:\[bot\])?", regex::escape(name)))
            .map_err(|error| GitHubError::Configuration {
                message: format!("cannot build mention pattern for {name}: {error}"),
            })?;
        Ok(Self { pattern })
    }

    /// True when `body` addresses the bot on any line.
    #[must_use]
    pub fn mentions(&self, body: &str) -> bool {
        body.lines()
            .any(|line| self.command_text(line.trim()).is_some())
    }

    /// Returns the invocations in `body`, one per qualifying line, in order.
    ///
    /// Quoted lines never qualify. Lines that are empty once the mention and
    /// courtesy phrases are removed are dropped.
    ///
    /// # Example
    ///
    /// ```
    /// use butler::commands::parser::{Invocation, MentionParser};
    ///
    /// let parser = MentionParser::new("butler").expect("valid name");
    /// let found = parser.parse("> @butler ignored\n@butler please tag bug, docs");
    /// assert_eq!(found, vec![Invocation::new("tag", Some("bug, docs"))]);
    /// ```
    #[must_use]
    pub fn parse(&self, body: &str) -> Vec<Invocation> {
        body.lines()
            .filter_map(|line| self.command_text(line.trim()))
            .filter_map(split_invocation)
            .collect()
    }

    fn command_text<'a>(&self, line: &'a str) -> Option<&'a str> {
        if let Some(rest) = RAW_PREFIXES
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
        {
            return Some(rest);
        }
        if line.starts_with(QUOTE_MARKER) {
            return None;
        }
        self.pattern
            .find_iter(line)
            .last()
            .and_then(|found| line.get(found.end()..))
    }
}

/// Drops a leading `please`, then a leading `run`, each only as a whole word.
fn strip_courtesy(text: &str) -> &str {
    COURTESY_WORDS.iter().fold(text.trim(), |remaining, word| {
        match remaining.strip_prefix(word) {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                rest.trim_start()
            }
            _ => remaining,
        }
    })
}

fn split_invocation(text: &str) -> Option<Invocation> {
    let command_line = strip_courtesy(text);
    if command_line.is_empty() {
        return None;
    }
    let (command, arguments) = command_line
        .split_once(char::is_whitespace)
        .map_or((command_line, None), |(command, rest)| {
            let trimmed = rest.trim();
            (command, (!trimmed.is_empty()).then_some(trimmed))
        });
    Some(Invocation::new(command, arguments))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::{Invocation, MentionParser};

    #[fixture]
    fn parser() -> MentionParser {
        MentionParser::new("butler").expect("parser should build")
    }

    #[rstest]
    fn parses_every_mention_form_in_order(parser: MentionParser) {
        let body = "\n@butler nothing\n@butler[bot] do nothing\nBUTLER[bot] do something\n\n";

        assert_eq!(
            parser.parse(body),
            vec![
                Invocation::new("nothing", None),
                Invocation::new("do", Some("nothing")),
                Invocation::new("do", Some("something")),
            ]
        );
    }

    #[rstest]
    #[case::plain("@butler hello", "hello", None)]
    #[case::please("@butler please merge", "merge", None)]
    #[case::please_run("@butler please run backport to 4.x", "backport", Some("to 4.x"))]
    #[case::run_only("@butler run   tag  bug,docs ", "tag", Some("bug,docs"))]
    #[case::raw_bang("!butler zen", "zen", None)]
    #[case::raw_bot("bot> migrate to octo/other", "migrate", Some("to octo/other"))]
    #[case::mid_sentence("hey @butler help", "help", None)]
    #[case::courtesy_prefix_of_word("@butler runner go", "runner", Some("go"))]
    fn extracts_command_and_arguments(
        parser: MentionParser,
        #[case] body: &str,
        #[case] command: &str,
        #[case] arguments: Option<&str>,
    ) {
        assert_eq!(parser.parse(body), vec![Invocation::new(command, arguments)]);
    }

    #[rstest]
    #[case::quoted("> @butler merge")]
    #[case::indented_quote("   > @butler merge")]
    #[case::unrelated("thanks everyone")]
    #[case::bare_mention("@butler")]
    #[case::only_courtesy("@butler please ")]
    #[case::only_courtesy_words("@butler please run")]
    fn yields_nothing(parser: MentionParser, #[case] body: &str) {
        assert!(parser.parse(body).is_empty(), "expected no invocations for {body:?}");
    }

    #[rstest]
    fn quoted_lines_are_skipped_between_real_mentions(parser: MentionParser) {
        let body = "@butler tag bug\n> @butler untag bug\n@butler close";

        let commands: Vec<String> = parser
            .parse(body)
            .into_iter()
            .map(|invocation| invocation.command)
            .collect();

        assert_eq!(commands, vec!["tag".to_owned(), "close".to_owned()]);
    }

    #[rstest]
    fn mentions_detects_raw_prefixes(parser: MentionParser) {
        assert!(parser.mentions("bot> hello"));
        assert!(parser.mentions("text\n@Butler hello"));
        assert!(!parser.mentions("> @butler hello"));
    }

    #[rstest]
    fn rejects_empty_bot_name() {
        assert!(MentionParser::new(" @ ").is_err(), "blank name should be rejected");
    }
}
