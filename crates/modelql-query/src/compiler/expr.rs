//! Expression lowering and qualified-name resolution.

use super::{CompilationScope, Compiler};
use modelql_core::error::{BindErrorKind, CompileErrorKind};
use modelql_core::fragment::{SelectFragment, SqlExpr};
use modelql_core::ir::{Expr, Literal, Placeholder, SelectStatement};
use modelql_core::{BindType, Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// A column resolved to its table reference and physical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Qualified {
    /// `None` when the name is a column alias of the current level
    pub domain: Option<String>,
    pub name: String,
    /// Attribute name as written; absent for column aliases
    pub balias: Option<String>,
}

impl Qualified {
    pub fn into_expr(self) -> SqlExpr {
        SqlExpr::Qualified {
            domain: self.domain,
            name: self.name,
        }
    }
}

fn valid_placeholder_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[\w-]+$").ok())
        .as_ref()
        .is_none_or(|pattern| pattern.is_match(name))
}

/// Render a literal as SQL text.
pub(crate) fn literal_sql(literal: &Literal) -> String {
    match literal {
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
        Literal::Integer(i) => i.to_string(),
        Literal::Double(f) => f.to_string(),
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Null => "NULL".to_string(),
    }
}

impl Compiler<'_> {
    /// Resolve `[domain.]name` against `scope`.
    pub(crate) fn get_qualified(
        &self,
        name: &str,
        domain: Option<&str>,
        scope: &CompilationScope,
    ) -> Result<Qualified> {
        let Some(domain) = domain else {
            if scope.column_aliases.contains(name) {
                return Ok(Qualified {
                    domain: None,
                    name: name.to_string(),
                    balias: None,
                });
            }
            return self.get_unqualified(name, scope);
        };

        let Some(reference) = scope.sql_aliases.get(domain) else {
            return Err(Error::compile(
                CompileErrorKind::UnknownAlias,
                format!("Unknown model or alias '{}'", domain),
            ));
        };

        let real = if self.options.column_renaming {
            let model = scope.model_of(domain).unwrap_or(domain);
            match self.meta_data.get_reverse_column_map(model) {
                Some(map) => map.get(name).cloned().ok_or_else(|| {
                    Error::compile(
                        CompileErrorKind::UnknownColumn,
                        format!(
                            "Column '{}' doesn't belong to the model or alias '{}'",
                            name, domain
                        ),
                    )
                })?,
                None => name.to_string(),
            }
        } else {
            name.to_string()
        };

        Ok(Qualified {
            domain: Some(reference.clone()),
            name: real,
            balias: Some(name.to_string()),
        })
    }

    /// Find the single model of the scope owning `name`.
    fn get_unqualified(&self, name: &str, scope: &CompilationScope) -> Result<Qualified> {
        let mut owner = None;
        for model in scope.models.keys() {
            if self.meta_data.has_attribute(model, name) {
                if owner.is_some() {
                    return Err(Error::compile(
                        CompileErrorKind::AmbiguousColumn,
                        format!("The column '{}' is ambiguous", name),
                    ));
                }
                owner = Some(model);
            }
        }

        let not_found = || {
            Error::compile(
                CompileErrorKind::UnknownColumn,
                format!("Column '{}' doesn't belong to any of the selected models", name),
            )
        };
        let model = owner.ok_or_else(not_found)?;
        let reference = scope.models.get(model).ok_or_else(not_found)?;

        let real = if self.options.column_renaming {
            match self.meta_data.get_reverse_column_map(model) {
                Some(map) => map.get(name).cloned().ok_or_else(not_found)?,
                None => name.to_string(),
            }
        } else {
            name.to_string()
        };

        Ok(Qualified {
            domain: Some(reference.clone()),
            name: real,
            balias: Some(name.to_string()),
        })
    }

    pub(crate) fn get_expression(
        &mut self,
        expr: &Expr,
        scope: &CompilationScope,
    ) -> Result<SqlExpr> {
        Ok(match expr {
            Expr::Column { name, domain } => self
                .get_qualified(name, domain.as_deref(), scope)?
                .into_expr(),

            Expr::Literal(literal) => SqlExpr::Literal(literal_sql(literal)),

            Expr::Placeholder(placeholder) => self.get_placeholder(placeholder)?,

            Expr::Binary { op, left, right } => SqlExpr::Binary {
                op: *op,
                left: Box::new(self.get_expression(left, scope)?),
                right: Box::new(self.get_expression(right, scope)?),
            },

            Expr::Unary { op, operand } => SqlExpr::Unary {
                op: *op,
                operand: Box::new(self.get_expression(operand, scope)?),
            },

            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => SqlExpr::Between {
                expr: Box::new(self.get_expression(expr, scope)?),
                low: Box::new(self.get_expression(low, scope)?),
                high: Box::new(self.get_expression(high, scope)?),
                negated: *negated,
            },

            Expr::Function {
                name,
                args,
                distinct,
            } => SqlExpr::Function {
                name: name.clone(),
                args: self.get_expressions(args, scope)?,
                distinct: *distinct,
            },

            Expr::Cast { expr, ty } => SqlExpr::Cast {
                expr: Box::new(self.get_expression(expr, scope)?),
                ty: ty.clone(),
            },

            Expr::Convert { expr, charset } => SqlExpr::Convert {
                expr: Box::new(self.get_expression(expr, scope)?),
                charset: charset.clone(),
            },

            Expr::Case {
                operand,
                whens,
                else_,
            } => {
                let operand = match operand {
                    Some(operand) => Some(Box::new(self.get_expression(operand, scope)?)),
                    None => None,
                };
                let mut lowered = Vec::with_capacity(whens.len());
                for (condition, result) in whens {
                    lowered.push((
                        self.get_expression(condition, scope)?,
                        self.get_expression(result, scope)?,
                    ));
                }
                let else_ = match else_ {
                    Some(else_) => Some(Box::new(self.get_expression(else_, scope)?)),
                    None => None,
                };
                SqlExpr::Case {
                    operand,
                    whens: lowered,
                    else_,
                }
            }

            Expr::List(items) => SqlExpr::List(self.get_expressions(items, scope)?),

            Expr::Subquery(select) => SqlExpr::Select(Box::new(self.subquery(select, scope)?)),
            Expr::Exists(select) => SqlExpr::Exists(Box::new(self.subquery(select, scope)?)),
            Expr::All(select) => SqlExpr::All(Box::new(self.subquery(select, scope)?)),
            Expr::Any(select) => SqlExpr::Any(Box::new(self.subquery(select, scope)?)),

            Expr::Parentheses(inner) => {
                SqlExpr::Parentheses(Box::new(self.get_expression(inner, scope)?))
            }

            Expr::Star => SqlExpr::AllColumns(None),
        })
    }

    fn get_expressions(&mut self, exprs: &[Expr], scope: &CompilationScope) -> Result<Vec<SqlExpr>> {
        exprs
            .iter()
            .map(|expr| self.get_expression(expr, scope))
            .collect()
    }

    fn subquery(
        &mut self,
        select: &SelectStatement,
        scope: &CompilationScope,
    ) -> Result<SelectFragment> {
        let mut child = scope.child();
        tracing::trace!(level = child.nesting_level(), "compiling subquery");
        self.prepare_select(select, &mut child)
    }

    /// Lower a placeholder, recording the bind type of typed placeholders.
    pub(crate) fn get_placeholder(&mut self, placeholder: &Placeholder) -> Result<SqlExpr> {
        let name = placeholder.name();
        if !valid_placeholder_name(&name) {
            return Err(Error::compile(
                CompileErrorKind::CorruptedIr,
                format!("Invalid placeholder name '{}'", name),
            ));
        }

        let Placeholder::Typed {
            bind_type: Some(bind_type),
            ..
        } = placeholder
        else {
            return Ok(SqlExpr::Placeholder { name, times: None });
        };

        let scalar = match bind_type.as_str() {
            "str" => Some(BindType::Str),
            "int" => Some(BindType::Int),
            "double" => Some(BindType::Decimal),
            "bool" => Some(BindType::Bool),
            "blob" => Some(BindType::Blob),
            "null" => Some(BindType::Null),
            "array" | "array-str" | "array-int" => None,
            other => {
                return Err(Error::bind(
                    BindErrorKind::UnknownType,
                    name,
                    format!("Unknown bind type: {}", other),
                ));
            }
        };
        if let Some(scalar) = scalar {
            self.bind_types.insert(name.clone(), scalar);
            return Ok(SqlExpr::Placeholder { name, times: None });
        }

        let binds = self.binds;
        let Some(bound) = binds.get(&name) else {
            return Err(Error::bind(
                BindErrorKind::Missing,
                name.clone(),
                format!("Bind value is required for array type placeholder: {}", name),
            ));
        };
        let Some(items) = bound.as_array() else {
            return Err(Error::bind(
                BindErrorKind::NotArray,
                name.clone(),
                format!("Bind type requires an array in placeholder: {}", name),
            ));
        };
        if items.is_empty() {
            return Err(Error::bind(
                BindErrorKind::EmptyArray,
                name.clone(),
                format!("At least one value must be bound in placeholder: {}", name),
            ));
        }

        match bind_type.as_str() {
            "array-str" => {
                self.bind_types.insert(name.clone(), BindType::Str);
            }
            "array-int" => {
                self.bind_types.insert(name.clone(), BindType::Int);
            }
            _ => {}
        }
        self.array_placeholders.insert(name.clone());
        Ok(SqlExpr::Placeholder {
            times: Some(items.len()),
            name,
        })
    }
}
