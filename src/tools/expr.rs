//! Lightweight expression evaluator for LED pattern programs.
//!
//! Recursive-descent over a byte slice, no allocation on the happy path,
//! total on every input — malformed expressions evaluate to 0 rather
//! than failing, so a bad pattern renders black instead of wedging the
//! worker.
//!
//! Grammar (loosest binding first):
//!
//! ```text
//! logical_or  → logical_and ('||' logical_and)*
//! logical_and → comparison ('&&' comparison)*
//! comparison  → sum (('<'|'>'|'<='|'>='|'=='|'!=') sum)?
//! sum         → term (('+'|'-') term)*
//! term        → factor (('*'|'/'|'%') factor)*
//! factor      → '!' factor | unary
//! unary       → '-' unary | '(' logical_or ')' | number | ident
//! ident       → variable | function '(' logical_or (',' logical_or)? ')'
//! ```
//!
//! Booleans are floats: 0 is false, anything else is true, comparisons
//! yield 1.0/0.0. Division and modulo by zero yield 0. Equality uses a
//! 1e-4 epsilon. Unknown identifiers resolve through the variable hook
//! (wired to InPort values by the pattern tool) and fall back to 0.

fn truth(b: bool) -> f32 {
    if b { 1.0 } else { 0.0 }
}

/// Hook for resolving free identifiers (e.g. InPort names).
pub type VarResolver<'a> = &'a dyn Fn(&str) -> Option<f32>;

pub struct ExpressionEvaluator<'a> {
    expr: &'a [u8],
    pos: usize,
    theta: f32,
    t: f32,
    i: f32,
    vars: Option<VarResolver<'a>>,
}

/// Evaluate with the three pattern variables only.
pub fn eval(expr: &str, theta: f32, t: f32, i: i32) -> f32 {
    ExpressionEvaluator::new(expr, theta, t, i, None).run()
}

/// Evaluate with an extra variable resolver consulted for unknown names.
pub fn eval_with_vars(expr: &str, theta: f32, t: f32, i: i32, vars: VarResolver<'_>) -> f32 {
    ExpressionEvaluator::new(expr, theta, t, i, Some(vars)).run()
}

impl<'a> ExpressionEvaluator<'a> {
    fn new(expr: &'a str, theta: f32, t: f32, i: i32, vars: Option<VarResolver<'a>>) -> Self {
        Self {
            expr: expr.as_bytes(),
            pos: 0,
            theta,
            t,
            i: i as f32,
            vars,
        }
    }

    fn run(&mut self) -> f32 {
        let v = self.logical_or();
        if v.is_finite() { v } else { 0.0 }
    }

    // ── Lexing helpers ────────────────────────────────────────

    fn peek(&self) -> u8 {
        self.expr.get(self.pos).copied().unwrap_or(0)
    }

    fn peek2(&self) -> u8 {
        self.expr.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    // ── Grammar ───────────────────────────────────────────────

    fn logical_or(&mut self) -> f32 {
        self.skip_ws();
        let mut result = self.logical_and();
        loop {
            self.skip_ws();
            if self.peek() == b'|' && self.peek2() == b'|' {
                self.pos += 2;
                let right = self.logical_and();
                result = truth(result != 0.0 || right != 0.0);
            } else {
                break;
            }
        }
        result
    }

    fn logical_and(&mut self) -> f32 {
        self.skip_ws();
        let mut result = self.comparison();
        loop {
            self.skip_ws();
            if self.peek() == b'&' && self.peek2() == b'&' {
                self.pos += 2;
                let right = self.comparison();
                result = truth(result != 0.0 && right != 0.0);
            } else {
                break;
            }
        }
        result
    }

    fn comparison(&mut self) -> f32 {
        self.skip_ws();
        let result = self.sum();

        self.skip_ws();
        let op1 = self.peek();
        if matches!(op1, b'<' | b'>' | b'=' | b'!') {
            // `=` alone and `!` alone are not comparison operators.
            let op2 = self.peek2();
            if op2 == b'=' {
                self.pos += 2;
                let right = self.sum();
                return match op1 {
                    b'<' => truth(result <= right),
                    b'>' => truth(result >= right),
                    b'=' => truth((result - right).abs() < 1e-4),
                    _ => truth((result - right).abs() >= 1e-4),
                };
            }
            if op1 == b'<' || op1 == b'>' {
                self.pos += 1;
                let right = self.sum();
                return match op1 {
                    b'<' => truth(result < right),
                    _ => truth(result > right),
                };
            }
        }
        result
    }

    fn sum(&mut self) -> f32 {
        self.skip_ws();
        let mut result = self.term();
        loop {
            self.skip_ws();
            match self.peek() {
                b'+' => {
                    self.pos += 1;
                    result += self.term();
                }
                b'-' => {
                    self.pos += 1;
                    result -= self.term();
                }
                _ => break,
            }
        }
        result
    }

    fn term(&mut self) -> f32 {
        self.skip_ws();
        let mut result = self.factor();
        loop {
            self.skip_ws();
            match self.peek() {
                b'*' => {
                    self.pos += 1;
                    result *= self.factor();
                }
                b'/' => {
                    self.pos += 1;
                    let right = self.factor();
                    result = if right != 0.0 { result / right } else { 0.0 };
                }
                b'%' => {
                    self.pos += 1;
                    let right = self.factor();
                    result = if right != 0.0 { result % right } else { 0.0 };
                }
                _ => break,
            }
        }
        result
    }

    fn factor(&mut self) -> f32 {
        self.skip_ws();
        if self.peek() == b'!' && self.peek2() != b'=' {
            self.pos += 1;
            return truth(self.factor() == 0.0);
        }
        self.unary()
    }

    fn unary(&mut self) -> f32 {
        self.skip_ws();

        if self.peek() == b'-' {
            self.pos += 1;
            return -self.unary();
        }

        if self.peek() == b'(' {
            self.pos += 1;
            let result = self.logical_or();
            self.skip_ws();
            if self.peek() == b')' {
                self.pos += 1;
            }
            return result;
        }

        if self.peek().is_ascii_digit() || self.peek() == b'.' {
            return self.number();
        }

        if self.peek().is_ascii_alphabetic() {
            return self.identifier();
        }

        // Unparseable byte: consume it so the scan always terminates.
        if self.peek() != 0 {
            self.pos += 1;
        }
        0.0
    }

    fn number(&mut self) -> f32 {
        let start = self.pos;
        while self.peek().is_ascii_digit() || self.peek() == b'.' {
            self.pos += 1;
        }
        core::str::from_utf8(&self.expr[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.0)
    }

    fn identifier(&mut self) -> f32 {
        let start = self.pos;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.pos += 1;
        }
        let name = core::str::from_utf8(&self.expr[start..self.pos]).unwrap_or("");

        self.skip_ws();
        if self.peek() == b'(' {
            self.pos += 1;
            let arg1 = self.logical_or();
            self.skip_ws();

            if self.peek() == b',' {
                self.pos += 1;
                let arg2 = self.logical_or();
                self.skip_ws();
                if self.peek() == b')' {
                    self.pos += 1;
                }
                return match name {
                    "max" => arg1.max(arg2),
                    "min" => arg1.min(arg2),
                    "mod" => {
                        if arg2 != 0.0 {
                            arg1 % arg2
                        } else {
                            0.0
                        }
                    }
                    "pow" => arg1.powf(arg2),
                    _ => 0.0,
                };
            }

            if self.peek() == b')' {
                self.pos += 1;
            }
            return match name {
                "sin" => arg1.sin(),
                "cos" => arg1.cos(),
                "tan" => arg1.tan(),
                "abs" => arg1.abs(),
                "sqrt" => {
                    if arg1 >= 0.0 {
                        arg1.sqrt()
                    } else {
                        0.0
                    }
                }
                "floor" => arg1.floor(),
                "round" => arg1.round(),
                _ => 0.0,
            };
        }

        match name {
            "theta" => self.theta,
            "t" => self.t,
            "i" => self.i,
            "pi" => core::f32::consts::PI,
            other => self
                .vars
                .and_then(|resolve| resolve(other))
                .unwrap_or(0.0),
        }
    }
}
