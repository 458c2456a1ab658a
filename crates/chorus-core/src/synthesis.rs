//! Synthesis prompt construction.
//!
//! Seat outputs are merged into one labeled prompt, in synthesis order
//! (coding, creative, conversational), with a placeholder for every seat that
//! failed or never answered. The identity prefix is prepended exactly once.

use chorus_types::batch::SeatResult;
use chorus_types::seat::Seat;

/// Instruction given to the synthesizing model ahead of the seat sections.
pub const SYNTHESIS_INSTRUCTION: &str = "You are combining answers from several expert models into one reply. \
Merge the sections below into a single coherent response in your own voice. \
Keep the strongest technical detail, keep the tone natural, and do not mention \
the experts, the sections, or any expert that failed to respond.";

/// Prepend the identity prefix to a prompt body. An empty prefix leaves the
/// body untouched.
pub fn condition_prompt(identity_prefix: &str, body: &str) -> String {
    let prefix = identity_prefix.trim_end();
    if prefix.is_empty() {
        body.to_string()
    } else {
        format!("{prefix}\n\n{body}")
    }
}

/// Build the synthesis prompt from batch results.
///
/// Every seat gets a section, in seat order. A seat with several results
/// gets one section per result in input order; a seat that failed or has no
/// result at all contributes its placeholder instead of content.
/// `user_message`, when given, is restated so the synthesizer knows what the
/// answers respond to.
pub fn build_synthesis_prompt(
    results: &[SeatResult],
    identity_prefix: &str,
    user_message: Option<&str>,
) -> String {
    let mut body = String::from(SYNTHESIS_INSTRUCTION);

    if let Some(message) = user_message.map(str::trim).filter(|m| !m.is_empty()) {
        body.push_str("\n\n## User message\n");
        body.push_str(message);
    }

    for seat in Seat::ALL {
        let mut answers: Vec<&SeatResult> = results.iter().filter(|r| r.seat == seat).collect();
        answers.sort_by_key(|r| r.index);

        if answers.is_empty() {
            push_section(&mut body, seat, None);
        }
        for result in answers {
            push_section(&mut body, seat, result.content());
        }
    }

    condition_prompt(identity_prefix, &body)
}

fn push_section(body: &mut String, seat: Seat, content: Option<&str>) {
    body.push_str("\n\n## ");
    body.push_str(seat.label());
    body.push('\n');
    match content.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => body.push_str(text),
        None => body.push_str(&seat.failure_placeholder()),
    }
}

/// Best single seat answer, used when synthesis itself is unavailable.
///
/// Prefers the conversational seat, then coding, then creative.
pub fn best_available(results: &[SeatResult]) -> Option<&SeatResult> {
    const PREFERENCE: [Seat; 3] = [Seat::Conversational, Seat::Coding, Seat::Creative];
    PREFERENCE.iter().find_map(|seat| {
        results
            .iter()
            .find(|r| r.seat == *seat && r.content().is_some_and(|c| !c.trim().is_empty()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use chorus_types::error::DispatchError;

    fn ok(index: usize, seat: Seat, text: &str) -> SeatResult {
        SeatResult {
            index,
            seat,
            outcome: Ok(text.to_string()),
            attempts: 1,
            latency: Duration::from_millis(10),
        }
    }

    fn failed(index: usize, seat: Seat) -> SeatResult {
        SeatResult {
            index,
            seat,
            outcome: Err(DispatchError::Timeout {
                after: Duration::from_secs(1),
            }),
            attempts: 3,
            latency: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_condition_prompt() {
        assert_eq!(condition_prompt("", "hello"), "hello");
        assert_eq!(condition_prompt("**ZEN**\n", "hello"), "**ZEN**\n\nhello");
    }

    #[test]
    fn test_sections_follow_seat_order() {
        let results = vec![
            ok(0, Seat::Conversational, "chat"),
            ok(1, Seat::Creative, "poem"),
            ok(2, Seat::Coding, "code"),
        ];
        let prompt = build_synthesis_prompt(&results, "", None);

        let coding = prompt.find("## Coding expert\ncode").unwrap();
        let creative = prompt.find("## Creative expert\npoem").unwrap();
        let conversational = prompt.find("## Conversational expert\nchat").unwrap();
        assert!(coding < creative && creative < conversational);
        assert!(prompt.starts_with(SYNTHESIS_INSTRUCTION));
    }

    #[test]
    fn test_failed_seat_gets_placeholder() {
        let results = vec![
            ok(0, Seat::Coding, "code"),
            failed(1, Seat::Creative),
            ok(2, Seat::Conversational, "chat"),
        ];
        let prompt = build_synthesis_prompt(&results, "", None);
        assert!(prompt.contains("## Creative expert\n[creative expert failed to respond]"));
    }

    #[test]
    fn test_missing_seat_gets_placeholder() {
        let results = vec![ok(0, Seat::Coding, "x"), ok(1, Seat::Creative, "x")];
        let prompt = build_synthesis_prompt(&results, "", None);

        assert!(prompt.ends_with(
            "## Creative expert\nx\n\n## Conversational expert\n[conversational expert failed to respond]"
        ));
        assert_eq!(prompt.matches("## ").count(), 3);
    }

    #[test]
    fn test_repeated_seat_keeps_input_order() {
        let results = vec![
            ok(0, Seat::Creative, "second poem"),
            ok(1, Seat::Coding, "code"),
            ok(2, Seat::Creative, "third poem"),
        ];
        let prompt = build_synthesis_prompt(&results, "", None);

        let second = prompt.find("second poem").unwrap();
        let third = prompt.find("third poem").unwrap();
        assert!(prompt.find("## Coding expert\ncode").unwrap() < second && second < third);
        assert_eq!(prompt.matches("## Creative expert").count(), 2);
        assert!(prompt.contains("[conversational expert failed to respond]"));
    }

    #[test]
    fn test_identity_prefix_appears_once() {
        let prefix = "**YOU ARE ZEN, A CALM ASSISTANT**";
        let results = vec![ok(0, Seat::Coding, "code"), ok(1, Seat::Creative, "poem")];
        let prompt = build_synthesis_prompt(&results, prefix, Some("hi"));

        assert!(prompt.starts_with(prefix));
        assert_eq!(prompt.matches(prefix).count(), 1);
        assert!(prompt.contains("## User message\nhi"));
    }

    #[test]
    fn test_all_failed_still_builds_prompt() {
        let results: Vec<SeatResult> = Seat::ALL
            .iter()
            .enumerate()
            .map(|(i, &seat)| failed(i, seat))
            .collect();
        let prompt = build_synthesis_prompt(&results, "", None);
        for seat in Seat::ALL {
            assert!(prompt.contains(&seat.failure_placeholder()));
        }
    }

    #[test]
    fn test_best_available_prefers_conversational() {
        let results = vec![
            ok(0, Seat::Coding, "code"),
            failed(1, Seat::Creative),
            ok(2, Seat::Conversational, "chat"),
        ];
        assert_eq!(best_available(&results).unwrap().content(), Some("chat"));

        let results = vec![failed(0, Seat::Conversational), ok(1, Seat::Creative, "poem")];
        assert_eq!(best_available(&results).unwrap().content(), Some("poem"));

        let results = vec![failed(0, Seat::Coding)];
        assert!(best_available(&results).is_none());
    }
}
