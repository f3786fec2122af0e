use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::types::Card;

/// Most cards a single search returns.
pub const MAX_RESULTS: usize = 50;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(-?)(?:"([^"]*)"|(\S+))"#).expect("token pattern is valid"));

/// Query string parameters of a card search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Text(String),
    Label(String),
    Assignee(String),
    Completed(bool),
    Overdue,
}

#[derive(Debug, Clone, PartialEq)]
struct ParsedTerm {
    negate: bool,
    term: Term,
}

/// Compiled card filter.
///
/// Free text matches title or description case-insensitively; quoted phrases
/// match as a whole. Inline filters: `label:x`, `assignee:x`, `is:done`,
/// `is:open`, `due:overdue`. A leading `-` negates a term.
#[derive(Debug, Clone)]
pub struct CardFilter {
    terms: Vec<ParsedTerm>,
    now: DateTime<Utc>,
}

impl CardFilter {
    pub fn compile(query: &CardQuery) -> Self {
        let mut terms: Vec<ParsedTerm> = query
            .q
            .as_deref()
            .map(parse_terms)
            .unwrap_or_default();
        if let Some(label) = query.label.as_deref().filter(|l| !l.trim().is_empty()) {
            terms.push(ParsedTerm {
                negate: false,
                term: Term::Label(label.trim().to_lowercase()),
            });
        }
        if let Some(assignee) = query.assignee.as_deref().filter(|a| !a.trim().is_empty()) {
            terms.push(ParsedTerm {
                negate: false,
                term: Term::Assignee(assignee.trim().to_string()),
            });
        }
        Self {
            terms,
            now: Utc::now(),
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        self.terms.iter().all(|t| self.term_matches(&t.term, card) != t.negate)
    }

    fn term_matches(&self, term: &Term, card: &Card) -> bool {
        match term {
            Term::Text(text) => {
                card.title.to_lowercase().contains(text)
                    || card.description.to_lowercase().contains(text)
            }
            Term::Label(label) => card.labels.iter().any(|l| l.to_lowercase() == *label),
            Term::Assignee(user) => card.assignees.iter().any(|a| a == user),
            Term::Completed(done) => card.is_completed == *done,
            Term::Overdue => card
                .due_date
                .is_some_and(|due| due < self.now && !card.is_completed),
        }
    }
}

fn parse_terms(input: &str) -> Vec<ParsedTerm> {
    TOKEN_RE
        .captures_iter(input)
        .filter_map(|caps| {
            let negate = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            if let Some(phrase) = caps.get(2) {
                let phrase = phrase.as_str().trim().to_lowercase();
                return (!phrase.is_empty()).then_some(ParsedTerm {
                    negate,
                    term: Term::Text(phrase),
                });
            }
            let word = caps.get(3)?.as_str();
            Some(ParsedTerm {
                negate,
                term: parse_word(word),
            })
        })
        .collect()
}

fn parse_word(word: &str) -> Term {
    let lower = word.to_lowercase();
    match lower.split_once(':') {
        Some(("label", value)) if !value.is_empty() => Term::Label(value.to_string()),
        Some(("assignee", _)) if word.len() > "assignee:".len() => {
            Term::Assignee(word["assignee:".len()..].to_string())
        }
        Some(("is", "done")) | Some(("is", "completed")) => Term::Completed(true),
        Some(("is", "open")) => Term::Completed(false),
        Some(("due", "overdue")) => Term::Overdue,
        _ => Term::Text(lower),
    }
}

/// Filter `cards` (already in display order) and cap the result.
pub fn search<'a>(cards: impl IntoIterator<Item = &'a Card>, query: &CardQuery) -> Vec<Card> {
    let filter = CardFilter::compile(query);
    cards
        .into_iter()
        .filter(|c| filter.matches(c))
        .take(MAX_RESULTS)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::List;

    fn card(title: &str, labels: &[&str], assignees: &[&str]) -> Card {
        let list = List::new("Todo", "b1", 1024.0);
        let mut card = Card::new(title, &list, 1024.0);
        card.labels = labels.iter().map(|s| s.to_string()).collect();
        card.assignees = assignees.iter().map(|s| s.to_string()).collect();
        card
    }

    fn q(text: &str) -> CardQuery {
        CardQuery {
            q: Some(text.to_string()),
            ..CardQuery::default()
        }
    }

    #[test]
    fn test_parse_quoted_and_negated() {
        let terms = parse_terms(r#"release "exact phrase" -label:bug"#);
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[1].term, Term::Text("exact phrase".into()));
        assert!(terms[2].negate);
        assert_eq!(terms[2].term, Term::Label("bug".into()));
    }

    #[test]
    fn test_text_is_case_insensitive() {
        let c = card("Fix Login Redirect", &[], &[]);
        assert!(CardFilter::compile(&q("login")).matches(&c));
        assert!(CardFilter::compile(&q("\"login redirect\"")).matches(&c));
        assert!(!CardFilter::compile(&q("logout")).matches(&c));
    }

    #[test]
    fn test_label_and_assignee_params() {
        let cards = vec![
            card("A", &["Bug"], &["u1"]),
            card("B", &["feature"], &["u1"]),
            card("C", &["bug"], &["u2"]),
        ];
        let query = CardQuery {
            q: None,
            label: Some("bug".into()),
            assignee: Some("u1".into()),
        };
        let found = search(&cards, &query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "A");
    }

    #[test]
    fn test_completion_and_negation() {
        let mut done = card("Ship it", &[], &[]);
        done.is_completed = true;
        let open = card("Ship docs", &[], &[]);
        let cards = vec![done, open];
        assert_eq!(search(&cards, &q("ship is:open"))[0].title, "Ship docs");
        assert_eq!(search(&cards, &q("ship -docs")).len(), 1);
    }

    #[test]
    fn test_overdue() {
        let mut late = card("Taxes", &[], &[]);
        late.due_date = Some(Utc::now() - chrono::Duration::days(2));
        let none = card("Someday", &[], &[]);
        let cards = vec![late, none];
        let found = search(&cards, &q("due:overdue"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Taxes");
    }

    #[test]
    fn test_results_capped() {
        let cards: Vec<Card> = (0..80).map(|i| card(&format!("task {}", i), &[], &[])).collect();
        assert_eq!(search(&cards, &q("task")).len(), MAX_RESULTS);
    }
}
