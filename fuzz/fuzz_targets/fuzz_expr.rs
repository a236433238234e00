//! Fuzz target: expression evaluator
//!
//! The evaluator must be total: any input string terminates and yields
//! a finite value, never panicking on malformed operators, unterminated
//! parentheses, or non-ASCII bytes.
//!
//! cargo fuzz run fuzz_expr

#![no_main]

use caphost::tools::expr;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = core::str::from_utf8(data) {
        let v = expr::eval(input, 1.0, 2.0, 3);
        assert!(v.is_finite());
    }
});
