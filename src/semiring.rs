//! The mwp growth-class semiring.
//!
//! Labels are totally ordered by severity:
//!
//! ```text
//! 0 < m < w < p < i
//! ```
//!
//! - `0` --- no dependency at all,
//! - `m` --- the value is bounded by the *maximum* of the inputs (plus a constant),
//! - `w` --- *weak* polynomial: a polynomial in inputs that are not themselves iterated,
//! - `p` --- *polynomial* dependency,
//! - `i` --- *infinite*: no polynomial bound can be derived.
//!
//! Two operations are defined over labels:
//!
//! - [`combine_choice`] (the semiring sum) joins alternatives and is simply the maximum,
//! - [`combine_seq`] (the semiring product) chains two flows along one path.
//!
//! The product follows the composition rules of the flow calculus:
//! `0` is absorbing (no flow anywhere on the path means no flow), `m` is the unit,
//! `i` absorbs every other non-zero label, and otherwise the more severe label wins.

use std::fmt;
use std::str::FromStr;

/// A growth class.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum Label {
    /// No dependency.
    #[default]
    Zero,
    /// Maximum (linear) dependency.
    Max,
    /// Weak polynomial dependency.
    Weak,
    /// Polynomial dependency.
    Poly,
    /// Unbounded.
    Infinite,
}

impl Label {
    /// All labels, in severity order.
    pub const ALL: [Label; 5] = [Label::Zero, Label::Max, Label::Weak, Label::Poly, Label::Infinite];

    pub fn is_zero(self) -> bool {
        self == Label::Zero
    }

    pub fn is_infinite(self) -> bool {
        self == Label::Infinite
    }

    /// Single-character symbol of the label, as used in the literature.
    pub fn symbol(self) -> char {
        match self {
            Label::Zero => '0',
            Label::Max => 'm',
            Label::Weak => 'w',
            Label::Poly => 'p',
            Label::Infinite => 'i',
        }
    }

    /// Severity rank, `0` for [`Label::Zero`] up to `4` for [`Label::Infinite`].
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Semiring product: `a` followed by `b` along a single path.
pub fn combine_seq(a: Label, b: Label) -> Label {
    match (a, b) {
        (Label::Zero, _) | (_, Label::Zero) => Label::Zero,
        (Label::Infinite, _) | (_, Label::Infinite) => Label::Infinite,
        (Label::Max, x) | (x, Label::Max) => x,
        (x, y) => x.max(y),
    }
}

/// Semiring sum: `a` or `b`.
pub fn combine_choice(a: Label, b: Label) -> Label {
    a.max(b)
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<char> for Label {
    type Error = String;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '0' | 'o' => Ok(Label::Zero),
            'm' => Ok(Label::Max),
            'w' => Ok(Label::Weak),
            'p' => Ok(Label::Poly),
            'i' => Ok(Label::Infinite),
            _ => Err(format!("unknown growth label '{}'", c)),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Label::try_from(c),
            _ => Err(format!("unknown growth label '{}'", s)),
        }
    }
}
