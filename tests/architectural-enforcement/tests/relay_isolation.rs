//! Integration Test: Relay Isolation
//!
//! **Policy**: The relay layer (`chat/core/src/backend`) turns a request into
//! fragments and nothing else. It MUST NOT reach into the conversation store
//! or the controller; all conversation state changes go through the controller.

use architectural_enforcement::{rust_files, test_module_start};

const FORBIDDEN: &[&str] = &[
    "crate::store",
    "crate::controller",
    "Conversation",
    "ConversationController",
];

#[test]
fn test_relays_do_not_touch_conversation_state() {
    let files = rust_files("chat/core/src/backend");
    assert!(!files.is_empty(), "relay sources not found");

    let mut violations = Vec::new();
    for file in &files {
        let test_start = test_module_start(file).unwrap_or(usize::MAX);

        for (line_number, code) in file.code_lines() {
            if line_number >= test_start {
                break;
            }
            // Doc comments are stripped by code_lines, so only code matches
            if let Some(name) = FORBIDDEN.iter().find(|name| code.contains(*name)) {
                violations.push(format!(
                    "{}:{} - uses {name}: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "\nRelay code depends on conversation state:\n  {}\n",
        violations.join("\n  ")
    );
}

#[test]
fn test_store_does_not_call_relays() {
    let files = rust_files("chat/core/src");
    let store = files
        .iter()
        .find(|f| f.path.ends_with("store.rs"))
        .expect("store.rs not found");

    let test_start = test_module_start(store).unwrap_or(usize::MAX);
    for (line_number, code) in store.code_lines() {
        if line_number >= test_start {
            break;
        }
        assert!(
            !code.contains(".stream(") && !code.contains("Relay"),
            "{}:{} - store must not drive relays: {}",
            store.path.display(),
            line_number,
            code.trim()
        );
    }
}
