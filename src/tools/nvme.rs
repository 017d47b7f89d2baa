//! PyNVMe test-case checks. Pure text inspection, no execution.

use super::{Practices, Validation};

/// Structural checks on a generated PyNVMe test.
///
/// Missing `pytest`/`pynvme` or a `def test_` function are errors; a
/// missing device fixture or missing assertions are warnings.
pub fn validate_test_syntax(code: &str) -> Validation {
    let mut v = Validation::new(None);

    for import in ["pytest", "pynvme"] {
        if !code.contains(import) {
            v.error(format!("Missing import: {}", import));
        }
    }
    if !code.contains("def test_") {
        v.error("No test function found (should start with 'def test_')");
    }
    if !code.contains("nvme") && !code.contains("subsystem") {
        v.warnings
            .push("No PyNVMe fixture (nvme/subsystem) detected".to_string());
    }
    if !code.contains("assert") {
        v.warnings.push("No assertions found in test".to_string());
    }
    v
}

pub fn check_best_practices(code: &str) -> Practices {
    let mut p = Practices::default();
    p.check(
        code.contains("nvme.close()") || code.contains("with "),
        "Proper resource cleanup detected",
        "Add proper cleanup: use context managers or explicit nvme.close()",
    );
    p.check(
        code.contains("try:") || code.contains("pytest.raises"),
        "Error handling present",
        "Consider adding error handling for robustness",
    );
    p.check(
        code.to_lowercase().contains("timeout"),
        "Timeout handling present",
        "Consider adding timeout parameters for long operations",
    );
    p.check(
        code.contains("\"\"\"") || code.contains("'''"),
        "Test documentation present",
        "Add docstring to explain test purpose and expected behavior",
    );
    p
}

/// Human-readable improvement list built from a validation result.
pub fn suggest_improvements(code: &str, validation: &Validation) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !validation.is_valid {
        lines.push("CRITICAL: Fix validation errors first".to_string());
        lines.extend(validation.errors.iter().map(|e| format!("  - {}", e)));
    }
    if !validation.warnings.is_empty() {
        lines.push("\nWARNINGS:".to_string());
        lines.extend(validation.warnings.iter().map(|w| format!("  - {}", w)));
    }
    if !code.contains("pytest.mark") {
        lines.push(
            "\nConsider adding pytest markers (@pytest.mark.parametrize, etc.)".to_string(),
        );
    }
    if !code.contains("logging") {
        lines.push("\nAdd logging for better debugging".to_string());
    }

    if lines.is_empty() {
        "Test looks good!".to_string()
    } else {
        lines.join("\n")
    }
}

pub const TEST_TYPES: [&str; 3] = ["read", "write", "admin"];

/// Skeleton test for `read`, `write` or `admin`. Anything else gets `read`.
pub fn test_template(test_type: &str) -> &'static str {
    match test_type {
        "write" => WRITE_TEMPLATE,
        "admin" => ADMIN_TEMPLATE,
        _ => READ_TEMPLATE,
    }
}

const READ_TEMPLATE: &str = r#"
import pytest
import pynvme as nvme

def test_sequential_read(nvme0):
    """Test sequential read operations."""
    # Test implementation here
    pass
"#;

const WRITE_TEMPLATE: &str = r#"
import pytest
import pynvme as nvme

def test_sequential_write(nvme0):
    """Test sequential write operations."""
    # Test implementation here
    pass
"#;

const ADMIN_TEMPLATE: &str = r#"
import pytest
import pynvme as nvme

def test_admin_command(nvme0):
    """Test NVMe admin commands."""
    # Test implementation here
    pass
"#;

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
import logging
import pytest
import pynvme as nvme

@pytest.mark.parametrize("lba", [0, 8])
def test_read(nvme0, lba):
    """Read one block."""
    with nvme0.open() as q:
        try:
            q.read(lba, timeout=5)
        except Exception:
            raise
    assert True
"#;

    #[test]
    fn missing_imports_and_function_are_errors() {
        let v = validate_test_syntax("print('hi')");
        assert!(!v.is_valid);
        assert_eq!(
            v.errors,
            vec![
                "Missing import: pytest",
                "Missing import: pynvme",
                "No test function found (should start with 'def test_')",
            ]
        );
        assert_eq!(v.warnings.len(), 2);
    }

    #[test]
    fn well_formed_test_is_valid() {
        let v = validate_test_syntax(GOOD);
        assert!(v.is_valid);
        assert!(v.errors.is_empty());
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn best_practices_split_good_and_missing() {
        let p = check_best_practices(GOOD);
        assert_eq!(p.good_practices.len(), 4);
        assert!(p.improvements_needed.is_empty());

        let p = check_best_practices("def test_x(): pass");
        assert!(p.good_practices.is_empty());
        assert_eq!(p.improvements_needed.len(), 4);
    }

    #[test]
    fn suggestions_for_clean_test() {
        let v = validate_test_syntax(GOOD);
        assert_eq!(suggest_improvements(GOOD, &v), "Test looks good!");
    }

    #[test]
    fn suggestions_lead_with_critical_errors() {
        let code = "x = 1";
        let v = validate_test_syntax(code);
        let s = suggest_improvements(code, &v);
        assert!(s.starts_with("CRITICAL: Fix validation errors first\n  - Missing import: pytest"));
        assert!(s.contains("\nWARNINGS:"));
        assert!(s.ends_with("Add logging for better debugging"));
    }

    #[test]
    fn unknown_template_falls_back_to_read() {
        assert!(test_template("trim").contains("test_sequential_read"));
        assert!(test_template("admin").contains("test_admin_command"));
    }
}
