use std::fmt;

/// Operators that test the field alone and bind nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

impl UnaryOp {
    pub fn render(&self, field: &str) -> String {
        match self {
            UnaryOp::IsNull => format!("{field} IS NULL"),
            UnaryOp::IsNotNull => format!("{field} IS NOT NULL"),
            UnaryOp::IsEmpty => format!("NULLIF({field}, '') IS NULL"),
            UnaryOp::IsNotEmpty => format!("NULLIF({field}, '') IS NOT NULL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
        }
    }

    /// LIKE-family operators take a pattern where `*` stands for `%`.
    pub fn is_pattern(&self) -> bool {
        matches!(self, CompareOp::Like | CompareOp::NotLike)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Unary(UnaryOp),
    Compare(CompareOp),
}

impl Operator {
    /// Accepts symbolic and word spellings, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "isnull" => Operator::Unary(UnaryOp::IsNull),
            "isnotnull" => Operator::Unary(UnaryOp::IsNotNull),
            "isempty" => Operator::Unary(UnaryOp::IsEmpty),
            "isnotempty" => Operator::Unary(UnaryOp::IsNotEmpty),
            "=" | "eq" => Operator::Compare(CompareOp::Eq),
            "!=" | "<>" | "ne" => Operator::Compare(CompareOp::Ne),
            ">" | "gt" => Operator::Compare(CompareOp::Gt),
            ">=" | "ge" => Operator::Compare(CompareOp::Ge),
            "<" | "lt" => Operator::Compare(CompareOp::Lt),
            "<=" | "le" => Operator::Compare(CompareOp::Le),
            "~" | "like" => Operator::Compare(CompareOp::Like),
            "!~" | "notlike" => Operator::Compare(CompareOp::NotLike),
            _ => return None,
        };
        Some(op)
    }
}
