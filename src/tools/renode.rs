//! RENODE artifact checks: scripts (`.resc`), platform descriptions
//! (`.repl`), C# peripheral models (`.cs`) and whole platforms.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::{Practices, Validation};

static PERIPHERAL_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+:\s*([\w\.]+)").expect("literal regex"));
static ADDRESS_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*0x[0-9A-Fa-f]+\s*,\s*\+0x[0-9A-Fa-f]+\s*>").expect("literal regex")
});

/// Kind of RENODE artifact. Unrecognised kinds only get the generic checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeType {
    Resc,
    Repl,
    Cs,
    Platform,
    Other,
}

impl CodeType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "resc" => CodeType::Resc,
            "repl" => CodeType::Repl,
            "cs" => CodeType::Cs,
            "platform" => CodeType::Platform,
            _ => CodeType::Other,
        }
    }

    /// File extension used when saving.
    pub fn extension(self) -> &'static str {
        match self {
            CodeType::Resc => ".resc",
            CodeType::Repl | CodeType::Platform => ".repl",
            CodeType::Cs => ".cs",
            CodeType::Other => ".txt",
        }
    }
}

pub fn validate_syntax(code: &str, code_type: &str) -> Validation {
    let mut v = Validation::new(Some(code_type.to_string()));
    let lower = code.to_lowercase();

    match CodeType::parse(code_type) {
        CodeType::Resc => {
            if !code.contains("mach create") && !code.contains("using sysbus") {
                v.warnings
                    .push("No machine creation or sysbus usage found".to_string());
            }
            let common = ["sysbus LoadELF", "machine StartGdbServer", "start"];
            if !common.iter().any(|c| code.contains(c)) {
                v.suggestions.push(
                    "Consider adding common RENODE commands like LoadELF or start".to_string(),
                );
            }
        }
        CodeType::Repl => {
            if !PERIPHERAL_DEF.is_match(code) {
                v.error("Invalid REPL syntax - missing peripheral definitions");
            }
            if !code.contains('@') {
                v.warnings
                    .push("No memory addresses (@) specified".to_string());
            }
            if !lower.contains("size:") {
                v.suggestions
                    .push("Consider specifying sizes for memory regions".to_string());
            }
        }
        CodeType::Cs => {
            if !code.contains("using Antmicro.Renode") {
                v.error("Missing RENODE namespace imports");
            }
            if !code.contains("class") {
                v.error("No class definition found");
            }
            if !code.contains(": IDoubleWordPeripheral") && !code.contains(": IBytePeripheral") {
                v.warnings.push(
                    "Consider implementing IDoubleWordPeripheral or IBytePeripheral".to_string(),
                );
            }
        }
        CodeType::Platform => {
            if !lower.contains("cpu:") && !lower.contains("nvic:") {
                v.warnings.push("No CPU or NVIC defined".to_string());
            }
            if !lower.contains("uart") && !lower.contains("usart") {
                v.suggestions
                    .push("Consider adding UART for debugging".to_string());
            }
        }
        CodeType::Other => {}
    }

    if code.trim().chars().count() < 10 {
        v.error("Code is too short or empty");
    }
    v
}

pub fn check_best_practices(code: &str, code_type: &str) -> Practices {
    let mut p = Practices::default();
    let kind = CodeType::parse(code_type);

    match kind {
        CodeType::Resc => {
            p.check(
                code.contains("# ") || code.contains("//"),
                "Code includes comments",
                "Add comments to explain script purpose",
            );
            p.check(
                code.contains("logLevel"),
                "Logging configuration present",
                "Consider setting appropriate logLevel",
            );
            p.check(
                code.contains("showAnalyzer") || code.contains("CreateTerminalTester"),
                "Output/analysis tools configured",
                "Add analyzer or terminal tester for debugging",
            );
        }
        CodeType::Repl => {
            p.check(
                code.contains("///"),
                "Documentation comments present",
                "Add /// documentation comments for peripherals",
            );
            if ADDRESS_RANGE.is_match(code) {
                p.good("Proper address range syntax used");
            }
            p.check(
                code.contains("IRQ") || code.contains("-> "),
                "Interrupt connections defined",
                "Consider defining interrupt connections",
            );
        }
        CodeType::Cs => {
            if code.contains("[Constructor]") {
                p.good("Constructor attribute used correctly");
            }
            p.check(
                code.contains("this.Log") || code.contains("this.DebugLog"),
                "Logging implemented",
                "Add logging for debugging (this.Log)",
            );
            p.check(
                code.contains("Reset()"),
                "Reset method implemented",
                "Implement Reset() method",
            );
            if code.contains("private") && code.contains("public") {
                p.good("Proper access modifiers used");
            }
        }
        CodeType::Platform | CodeType::Other => {}
    }

    if matches!(kind, CodeType::Resc | CodeType::Cs) && code.split('\n').count() > 100 {
        p.improvements_needed
            .push("Consider breaking large files into smaller modules".to_string());
    }
    p
}

pub fn suggest_improvements(code_type: &str, validation: &Validation) -> String {
    let mut lines = vec![format!(
        "=== Improvements for {} Code ===\n",
        code_type.to_uppercase()
    )];

    let mut section = |title: &str, marker: &str, items: &[String]| {
        lines.push(title.to_string());
        lines.extend(items.iter().map(|i| format!("  {} {}", marker, i)));
        lines.push(String::new());
    };
    if !validation.is_valid {
        section("CRITICAL ERRORS - Must fix:", "x", &validation.errors);
    }
    if !validation.warnings.is_empty() {
        section("WARNINGS:", "!", &validation.warnings);
    }
    if !validation.suggestions.is_empty() {
        section("SUGGESTIONS:", "*", &validation.suggestions);
    }

    let tips: &[&str] = match CodeType::parse(code_type) {
        CodeType::Resc => &[
            "RESC Script Tips:",
            "  - Use 'include @path/to/platform.repl' to load platforms",
            "  - Add 'emulation CreateUartPtyTerminal \"term\" \"/tmp/uart\"' for serial",
            "  - Use 'machine StartGdbServer 3333' for debugging",
        ],
        CodeType::Repl => &[
            "REPL Platform Tips:",
            "  - Use consistent indentation (4 spaces)",
            "  - Define memory regions with @ and size:",
            "  - Connect interrupts with '-> cpu@IRQ_NUMBER'",
        ],
        CodeType::Cs => &[
            "C# Peripheral Tips:",
            "  - Inherit from BasicDoubleWordPeripheral for simplicity",
            "  - Use [Constructor] attribute for dependency injection",
            "  - Implement IDisposable if managing resources",
        ],
        CodeType::Platform | CodeType::Other => &[],
    };
    lines.extend(tips.iter().map(|t| t.to_string()));
    lines.join("\n")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Compatibility {
    pub compatible: bool,
    pub architecture: String,
    pub detected_peripherals: Vec<String>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Detect peripherals and check CPU and interrupt controller presence for
/// `ARM` or `RISC-V`. Other architectures only get peripheral detection.
pub fn analyze_platform_compatibility(code: &str, target_arch: &str) -> Compatibility {
    let lower = code.to_lowercase();
    let mut analysis = Compatibility {
        compatible: true,
        architecture: target_arch.to_string(),
        detected_peripherals: ["uart", "gpio", "timer", "spi", "i2c"]
            .iter()
            .filter(|p| lower.contains(*p))
            .map(|p| p.to_uppercase())
            .collect(),
        issues: Vec::new(),
        recommendations: Vec::new(),
    };

    match target_arch {
        "ARM" => {
            if !code.contains("CortexM") && !code.contains("CortexA") {
                analysis.issues.push("No ARM Cortex CPU defined".to_string());
                analysis.compatible = false;
            }
            if !code.contains("NVIC") && !code.contains("GIC") {
                analysis
                    .recommendations
                    .push("Consider adding interrupt controller (NVIC/GIC)".to_string());
            }
        }
        "RISC-V" => {
            if !code.contains("RiscV") {
                analysis.issues.push("No RISC-V CPU defined".to_string());
                analysis.compatible = false;
            }
        }
        _ => {}
    }
    analysis
}

pub const TEMPLATE_TYPES: [&str; 6] = [
    "resc_basic",
    "resc_with_uart",
    "repl_platform",
    "repl_uart",
    "cs_peripheral",
    "robot_test",
];

/// Starter code by template name; unknown names get `resc_basic`.
pub fn template(template_type: &str) -> &'static str {
    match template_type {
        "resc_with_uart" => RESC_WITH_UART,
        "repl_platform" => REPL_PLATFORM,
        "repl_uart" => REPL_UART,
        "cs_peripheral" => CS_PERIPHERAL,
        "robot_test" => ROBOT_TEST,
        _ => RESC_BASIC,
    }
}

const RESC_BASIC: &str = r#"# RENODE Script Template
# Create and configure a basic machine

mach create "machine_name"
machine LoadPlatformDescription @platforms/boards/your_board.repl

# Load binary
sysbus LoadELF @path/to/firmware.elf

# Setup logging
logLevel -1

# Start simulation
start
"#;

const RESC_WITH_UART: &str = r#"# RENODE Script with UART
mach create
machine LoadPlatformDescription @platforms/boards/stm32f4_discovery.repl

# Create UART terminal
emulation CreateUartPtyTerminal "term" "/tmp/uart"
connector Connect sysbus.usart1 term

# Load and start
sysbus LoadELF @firmware.elf
start
"#;

const REPL_PLATFORM: &str = r#"// Platform Description Template
// Define your custom platform here

cpu: CPU.CortexM @ sysbus
    cpuType: "cortex-m4"
    nvic: nvic

nvic: IRQControllers.NVIC @ sysbus 0xE000E000
    systickFrequency: 72000000
    IRQ -> cpu@0

sram: Memory.MappedMemory @ sysbus 0x20000000
    size: 0x20000

flash: Memory.MappedMemory @ sysbus 0x08000000
    size: 0x100000
"#;

const REPL_UART: &str = r#"// UART Peripheral Definition

uart0: UART.STM32_UART @ sysbus <0x40011000, +0x400>
    frequency: 200000000
    IRQ -> nvic@37

uart1: UART.STM32_UART @ sysbus <0x40004400, +0x400>
    frequency: 200000000
    IRQ -> nvic@38
"#;

const CS_PERIPHERAL: &str = r#"using System;
using Antmicro.Renode.Core;
using Antmicro.Renode.Peripherals.Bus;
using Antmicro.Renode.Logging;

namespace Antmicro.Renode.Peripherals.CustomPeripherals
{
    public class CustomPeripheral : BasicDoubleWordPeripheral, IKnownSize
    {
        public CustomPeripheral(Machine machine) : base(machine)
        {
            DefineRegisters();
        }

        public long Size => 0x1000;

        public override void Reset()
        {
            base.Reset();
            // Reset peripheral state
        }

        private void DefineRegisters()
        {
            Registers.Control.Define(this)
                .WithFlag(0, out enabled, name: "EN")
                .WithReservedBits(1, 31);

            Registers.Status.Define(this)
                .WithFlag(0, FieldMode.Read, name: "READY")
                .WithReservedBits(1, 31);
        }

        private IFlagRegisterField enabled;

        private enum Registers : long
        {
            Control = 0x00,
            Status = 0x04
        }
    }
}
"#;

const ROBOT_TEST: &str = r#"*** Settings ***
Suite Setup                   Setup
Suite Teardown                Teardown
Test Setup                    Reset Emulation
Test Teardown                 Test Teardown
Resource                      ${RENODEKEYWORDS}

*** Variables ***
${UART}                       sysbus.uart0
${URI}                        @https://dl.antmicro.com/projects/renode

*** Test Cases ***
Should Boot And Print
    Execute Command          mach create
    Execute Command          machine LoadPlatformDescription @platforms/boards/stm32f4_discovery.repl
    Execute Command          sysbus LoadELF ${URI}/stm32f4_discovery--zephyr-shell.elf-s_184340-4d614eb2b1906ea4a2a05b313c025c3c4ba7c2e0

    Create Terminal Tester   ${UART}

    Start Emulation
    Wait For Line On Uart    Booting Zephyr
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_templates_validate_cleanly() {
        let resc = validate_syntax(template("resc_basic"), "resc");
        assert!(resc.is_valid);
        assert!(resc.warnings.is_empty());

        let repl = validate_syntax(template("repl_platform"), "repl");
        assert!(repl.is_valid);
        assert!(repl.warnings.is_empty());
        assert!(repl.suggestions.is_empty());

        let cs = validate_syntax(template("cs_peripheral"), "cs");
        assert!(cs.is_valid);
        // The template derives from BasicDoubleWordPeripheral, not the interface.
        assert_eq!(cs.warnings.len(), 1);
    }

    #[test]
    fn short_code_is_invalid_for_any_type() {
        let v = validate_syntax("start", "whatever");
        assert!(!v.is_valid);
        assert_eq!(v.errors, vec!["Code is too short or empty"]);
        assert_eq!(v.code_type.as_deref(), Some("whatever"));
    }

    #[test]
    fn repl_without_definitions_is_an_error() {
        let v = validate_syntax("this has no peripherals at all", "repl");
        assert!(!v.is_valid);
        assert!(v.errors[0].contains("missing peripheral definitions"));
    }

    #[test]
    fn repl_practices_detect_ranges_and_irqs() {
        let p = check_best_practices(template("repl_uart"), "repl");
        assert!(p
            .good_practices
            .contains(&"Proper address range syntax used".to_string()));
        assert!(p
            .good_practices
            .contains(&"Interrupt connections defined".to_string()));
        assert_eq!(
            p.improvements_needed,
            vec!["Add /// documentation comments for peripherals"]
        );
    }

    #[test]
    fn long_scripts_get_split_advice() {
        let code = "# x\n".repeat(120);
        let p = check_best_practices(&code, "resc");
        assert!(p
            .improvements_needed
            .contains(&"Consider breaking large files into smaller modules".to_string()));
    }

    #[test]
    fn suggestions_include_sections_and_tips() {
        let v = validate_syntax("class X {}", "cs");
        let s = suggest_improvements("cs", &v);
        assert!(s.starts_with("=== Improvements for CS Code ===\n"));
        assert!(s.contains("CRITICAL ERRORS - Must fix:\n  x Missing RENODE namespace imports"));
        assert!(s.contains("C# Peripheral Tips:"));
    }

    #[test]
    fn arm_compatibility() {
        let ok = analyze_platform_compatibility(template("repl_platform"), "ARM");
        assert!(ok.compatible);
        assert!(ok.recommendations.is_empty());

        let bad = analyze_platform_compatibility(template("repl_uart"), "ARM");
        assert!(!bad.compatible);
        assert_eq!(bad.detected_peripherals, vec!["UART"]);
        assert_eq!(bad.issues, vec!["No ARM Cortex CPU defined"]);
    }

    #[test]
    fn riscv_requires_riscv_cpu() {
        let a = analyze_platform_compatibility("cpu: CPU.RiscV32 @ sysbus", "RISC-V");
        assert!(a.compatible);
        let b = analyze_platform_compatibility("cpu: CPU.CortexM @ sysbus", "RISC-V");
        assert!(!b.compatible);
    }

    #[test]
    fn extensions_by_type() {
        assert_eq!(CodeType::parse("platform").extension(), ".repl");
        assert_eq!(CodeType::parse("CS").extension(), ".cs");
        assert_eq!(CodeType::parse("robot").extension(), ".txt");
    }
}
