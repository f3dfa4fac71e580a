use crate::{
    error::TopicsError,
    types::{MutationAck, MutationKind, TopicInput, TopicRef},
};

/// Minimum title length, in characters.
pub const MIN_TITLE_CHARS: usize = 3;
/// Minimum body length, in characters.
pub const MIN_BODY_CHARS: usize = 10;

/// Trim form input and enforce minimum lengths.
///
/// Lengths count Unicode scalar values, not bytes.
pub fn normalize_topic_input(input: TopicInput) -> Result<TopicInput, TopicsError> {
    let title = input.title.trim();
    let body = input.body.trim();

    if title.chars().count() < MIN_TITLE_CHARS {
        return Err(TopicsError::validation(
            "title_too_short",
            format!("o título deve ter pelo menos {MIN_TITLE_CHARS} caracteres"),
        ));
    }
    if body.chars().count() < MIN_BODY_CHARS {
        return Err(TopicsError::validation(
            "body_too_short",
            format!("o conteúdo deve ter pelo menos {MIN_BODY_CHARS} caracteres"),
        ));
    }

    Ok(TopicInput::new(title, body))
}

/// How a background mutation ended, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Server accepted the mutation; `resolved` is the entry's current ref.
    Applied { resolved: Option<TopicRef> },
    /// Server call failed and the optimistic change was rolled back.
    Failed { error: TopicsError },
    /// The entry disappeared before the result could be applied.
    Superseded,
}

/// Convert a settled mutation to a stable `MutationAck`.
pub fn normalize_settle_outcome(
    kind: MutationKind,
    target: TopicRef,
    outcome: SettleOutcome,
) -> MutationAck {
    match outcome {
        SettleOutcome::Applied { resolved } => MutationAck {
            kind,
            target,
            resolved,
            error_code: None,
            superseded: false,
        },
        SettleOutcome::Failed { error } => MutationAck {
            kind,
            target,
            resolved: None,
            error_code: Some(error.code),
            superseded: false,
        },
        SettleOutcome::Superseded => MutationAck {
            kind,
            target,
            resolved: None,
            error_code: None,
            superseded: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TopicsErrorCategory;

    #[test]
    fn rejects_short_title() {
        let err = normalize_topic_input(TopicInput::new("Ab", "long enough body"))
            .expect_err("two-character title must fail");
        assert_eq!(err.category, TopicsErrorCategory::Validation);
        assert_eq!(err.code, "title_too_short");
        assert_eq!(err.message, "o título deve ter pelo menos 3 caracteres");
    }

    #[test]
    fn rejects_short_body() {
        let err = normalize_topic_input(TopicInput::new("Renda Fixa", "curto"))
            .expect_err("short body must fail");
        assert_eq!(err.code, "body_too_short");
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 3 characters, 6 bytes.
        let input = normalize_topic_input(TopicInput::new("ção", "títulos pú"))
            .expect("multi-byte input at the limit should pass");
        assert_eq!(input.title, "ção");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let input = normalize_topic_input(TopicInput::new(
            "  Renda Fixa ",
            "\nAprenda sobre títulos públicos  ",
        ))
        .expect("valid input");
        assert_eq!(input.title, "Renda Fixa");
        assert_eq!(input.body, "Aprenda sobre títulos públicos");

        let err = normalize_topic_input(TopicInput::new("  ab  ", "0123456789"))
            .expect_err("padding does not count toward the minimum");
        assert_eq!(err.code, "title_too_short");
    }

    #[test]
    fn maps_failure_to_ack_with_stable_error_code() {
        let ack = normalize_settle_outcome(
            MutationKind::Update,
            TopicRef::Remote(3),
            SettleOutcome::Failed {
                error: TopicsError::from_status(503, "unavailable"),
            },
        );
        assert_eq!(ack.error_code.as_deref(), Some("server_error"));
        assert_eq!(ack.resolved, None);
        assert!(!ack.superseded);
    }

    #[test]
    fn maps_create_success_to_resolved_ref() {
        let ack = normalize_settle_outcome(
            MutationKind::Create,
            TopicRef::Provisional(1),
            SettleOutcome::Applied {
                resolved: Some(TopicRef::Remote(101)),
            },
        );
        assert_eq!(ack.target, TopicRef::Provisional(1));
        assert_eq!(ack.resolved, Some(TopicRef::Remote(101)));
        assert_eq!(ack.error_code, None);
    }
}
