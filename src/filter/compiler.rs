use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::filter::error::FilterError;
use crate::filter::operator::Operator;
use crate::filter::value::{BoundParam, ValueType, coerce};

/// Deepest `#and`/`#or` nesting accepted.
pub const MAX_DEPTH: usize = 32;

const ROOT_GROUP: &str = "<root>";

static FIELD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[[:alnum:]_.*-]+$").expect("valid field pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Join {
    #[default]
    And,
    Or,
}

impl Join {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Join::And => "AND",
            Join::Or => "OR",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "#and" => Some(Join::And),
            "#or" => Some(Join::Or),
            _ => None,
        }
    }
}

/// Predicate text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledFilter {
    pub predicate: String,
    pub params: IndexMap<String, BoundParam>,
}

impl CompiledFilter {
    pub fn is_empty(&self) -> bool {
        self.predicate.is_empty()
    }
}

/// Stateless filter compiler; one instance can serve any number of callers.
#[derive(Debug, Clone, Default)]
pub struct FilterCompiler {
    field_prefix: String,
}

// Per-compile bookkeeping. Groups are numbered in visiting order so that two
// groups never share a placeholder prefix, whatever their depth.
struct Session {
    next_group: usize,
    params: IndexMap<String, BoundParam>,
}

impl FilterCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix put in front of every field reference, e.g. `t.`.
    pub fn with_field_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.field_prefix = prefix.into();
        self
    }

    pub fn field_prefix(&self) -> &str {
        &self.field_prefix
    }

    pub fn compile(&self, tree: &Value) -> Result<CompiledFilter, FilterError> {
        self.compile_joined(tree, Join::And)
    }

    /// Compiles with `join` between the root-level predicates.
    pub fn compile_joined(&self, tree: &Value, join: Join) -> Result<CompiledFilter, FilterError> {
        let Value::Object(root) = tree else {
            return Err(FilterError::InvalidGroup(ROOT_GROUP.to_string()));
        };

        let mut session = Session {
            next_group: 1,
            params: IndexMap::new(),
        };
        let predicate = self.compile_group(root, join, 0, 0, &mut session)?;
        Ok(CompiledFilter {
            predicate,
            params: session.params,
        })
    }

    fn compile_group(
        &self,
        group: &Map<String, Value>,
        join: Join,
        group_no: usize,
        depth: usize,
        session: &mut Session,
    ) -> Result<String, FilterError> {
        let mut predicates = Vec::with_capacity(group.len());
        let mut leaf_no = 0;

        for (raw_key, condition) in group {
            let key = raw_key.split(':').next().unwrap_or_default();

            if let Some(nested_join) = Join::from_key(key) {
                if depth + 1 > MAX_DEPTH {
                    return Err(FilterError::TooDeep(MAX_DEPTH));
                }
                let Value::Object(nested) = condition else {
                    return Err(FilterError::InvalidGroup(raw_key.clone()));
                };
                let nested_no = session.next_group;
                session.next_group += 1;
                let nested = self.compile_group(nested, nested_join, nested_no, depth + 1, session)?;
                if !nested.is_empty() {
                    predicates.push(format!("({nested})"));
                }
                continue;
            }

            if !FIELD_PATTERN.is_match(key) {
                continue;
            }

            let Value::Object(condition) = condition else {
                return Err(FilterError::InvalidCondition(key.to_string()));
            };
            let field = format!("{}{}", self.field_prefix, key);

            let operator = match condition.get("operator") {
                None | Some(Value::Null) => return Err(FilterError::MissingOperator(key.to_string())),
                Some(Value::String(token)) => Operator::parse(token).ok_or_else(|| {
                    FilterError::UnknownOperator {
                        field: key.to_string(),
                        operator: token.clone(),
                    }
                })?,
                Some(other) => {
                    return Err(FilterError::UnknownOperator {
                        field: key.to_string(),
                        operator: other.to_string(),
                    });
                }
            };

            let compare = match operator {
                Operator::Unary(unary) => {
                    predicates.push(unary.render(&field));
                    continue;
                }
                Operator::Compare(compare) => compare,
            };

            // An absent value binds like an explicit null
            let value = condition.get("value").unwrap_or(&Value::Null);
            let declared = match condition.get("type") {
                Some(Value::String(name)) => ValueType::parse(name),
                _ => ValueType::default(),
            };
            let mut param = coerce(key, value, declared)?;
            if compare.is_pattern() {
                param = param.into_pattern();
            }

            leaf_no += 1;
            let placeholder = format!(":p{group_no}_{leaf_no}");
            predicates.push(format!("{field} {} {placeholder}", compare.as_sql()));
            session.params.insert(placeholder, param);
        }

        Ok(predicates.join(&format!(" {} ", join.as_sql())))
    }
}
