//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the chat core and CLI MUST NOT call sleep methods.
//! Waiting happens on I/O, channels, or `tokio::time::interval` ticks.
//! **Exceptions**: test modules.

use architectural_enforcement::{rust_files, test_module_start, PRODUCTION_DIRS};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("  - tokio::time::timeout() around an awaited operation");
        eprintln!("  - Test code (#[cfg(test)] modules, tests/ directories)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls outside test modules
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_files(dir) {
            let test_start = test_module_start(&file).unwrap_or(usize::MAX);

            for (line_number, code) in file.code_lines() {
                if line_number >= test_start {
                    break;
                }
                if code.contains("::sleep(") || code.contains(".sleep(") {
                    violations.push(format!(
                        "{}:{} - {}",
                        file.path.display(),
                        line_number,
                        code.trim()
                    ));
                }
            }
        }
    }

    violations
}
