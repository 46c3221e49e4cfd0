//! Explicit debug configuration, threaded through the compiler driver.
//!
//! Replaces the global mutable debug configuration of the source compiler
//! (see DESIGN.md): environment variables are parsed once into a
//! [`DebugOptions`] value at the process boundary (the CLI, or an embedding
//! host), and every driver entry point receives that value by argument.

use bitflags::bitflags;
use regex::Regex;
use std::env;

bitflags! {
    /// Named debug flags, bit-packed (`setDebugFlags`/`debugFlags` in spec.md §6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u32 {
        /// Print the unoptimized PIR after translation from RIR
        const PRINT_INTERMEDIATE       = 1 << 0;
        /// Print PIR after every pass in the pipeline
        const PRINT_OPTIMIZATION_PASSES = 1 << 1;
        /// Print the final PIR before lowering back to RIR
        const PRINT_FINAL_PIR         = 1 << 2;
        /// Emit a WARN-level log when a pass fails and is recovered
        const SHOW_WARNINGS           = 1 << 3;
        /// Print every DispatchTable on `disassemble`
        const PRINT_DISPATCH_TABLE    = 1 << 4;
    }
}

/// All recognized flag names, for error messages and round-tripping.
const FLAG_NAMES: &[(&str, DebugFlags)] = &[
    ("PrintIntermediate", DebugFlags::PRINT_INTERMEDIATE),
    ("PrintOptimizationPasses", DebugFlags::PRINT_OPTIMIZATION_PASSES),
    ("PrintFinalPir", DebugFlags::PRINT_FINAL_PIR),
    ("ShowWarnings", DebugFlags::SHOW_WARNINGS),
    ("PrintDispatchTable", DebugFlags::PRINT_DISPATCH_TABLE),
];

/// How to render disassembled PIR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugStyle {
    #[default]
    Standard,
    GraphViz,
    GraphVizBB,
}

impl DebugStyle {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Standard" => Some(DebugStyle::Standard),
            "GraphViz" => Some(DebugStyle::GraphViz),
            "GraphVizBB" => Some(DebugStyle::GraphVizBB),
            _ => None,
        }
    }
}

/// Explicit, immutable debug configuration threaded through the driver.
#[derive(Debug, Clone)]
pub struct DebugOptions {
    pub flags: DebugFlags,
    pub pass_filter: Regex,
    pub function_filter: Regex,
    pub style: DebugStyle,
    pub jit_tier: i32,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            flags: DebugFlags::empty(),
            pass_filter: Regex::new(".*").unwrap(),
            function_filter: Regex::new(".*").unwrap(),
            style: DebugStyle::default(),
            jit_tier: 0,
        }
    }
}

impl DebugOptions {
    /// Parse `DEBUG`, `DEBUG_PASS_FILTER`, `DEBUG_FUNCTION_FILTER`,
    /// `DEBUG_STYLE`, `ENABLE_JIT` per spec.md §6. Aborts the process with
    /// exit code 1 (listing valid flags) on an unrecognized `DEBUG` entry.
    pub fn from_env() -> Self {
        let mut opts = Self::default();

        if let Ok(spec) = env::var("DEBUG") {
            for name in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match FLAG_NAMES.iter().find(|(n, _)| *n == name) {
                    Some((_, flag)) => opts.flags |= *flag,
                    None => {
                        eprintln!("Unknown debug flag '{name}'\nValid flags are:");
                        for (n, _) in FLAG_NAMES {
                            eprintln!("- {n}");
                        }
                        std::process::exit(1);
                    }
                }
            }
        }

        if let Ok(pat) = env::var("DEBUG_PASS_FILTER") {
            if let Ok(re) = Regex::new(&pat) {
                opts.pass_filter = re;
            }
        }
        if let Ok(pat) = env::var("DEBUG_FUNCTION_FILTER") {
            if let Ok(re) = Regex::new(&pat) {
                opts.function_filter = re;
            }
        }
        if let Ok(style) = env::var("DEBUG_STYLE") {
            match DebugStyle::parse(&style) {
                Some(s) => opts.style = s,
                None => {
                    eprintln!("Unknown debug style '{style}'\nValid styles are: Standard, GraphViz, GraphVizBB");
                    std::process::exit(1);
                }
            }
        }
        if let Ok(tier) = env::var("ENABLE_JIT") {
            if let Ok(n) = tier.parse() {
                opts.jit_tier = n;
            }
        }

        opts
    }

    pub fn has(&self, flag: DebugFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn pass_enabled(&self, pass_name: &str) -> bool {
        self.pass_filter.is_match(pass_name)
    }

    pub fn function_enabled(&self, function_name: &str) -> bool {
        self.function_filter.is_match(function_name)
    }
}

/// `debugFlags(names...) -> int` (spec §6): bit-pack flag names into a
/// word. Unknown names are a `ParseError`, same as an unrecognized `DEBUG`
/// entry (spec §7).
pub fn debug_flags(names: &[&str]) -> crate::error::Result<u32> {
    let mut bits = DebugFlags::empty();
    for name in names {
        match FLAG_NAMES.iter().find(|(n, _)| n == name) {
            Some((_, flag)) => bits |= *flag,
            None => return Err(crate::error::Error::ParseError(format!("unknown debug flag '{name}'"))),
        }
    }
    Ok(bits.bits())
}

/// `setDebugFlags(flags: int)` (spec §6): the inverse — unpack a previously
/// packed word back into a [`DebugFlags`] value.
pub fn set_debug_flags(bits: u32) -> DebugFlags {
    DebugFlags::from_bits_truncate(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_flags() {
        let opts = DebugOptions::default();
        assert!(!opts.has(DebugFlags::SHOW_WARNINGS));
        assert!(opts.pass_enabled("Constantfold"));
    }

    #[test]
    fn debug_flags_pack_and_unpack_round_trip() {
        let bits = debug_flags(&["ShowWarnings", "PrintFinalPir"]).unwrap();
        let flags = set_debug_flags(bits);
        assert!(flags.contains(DebugFlags::SHOW_WARNINGS));
        assert!(flags.contains(DebugFlags::PRINT_FINAL_PIR));
        assert!(debug_flags(&["NotARealFlag"]).is_err());
    }

    #[test]
    fn flag_names_round_trip() {
        for (name, flag) in FLAG_NAMES {
            assert!(DebugFlags::empty().union(*flag).contains(*flag), "{name}");
        }
    }
}
