//! Cohort filtering over dataset rows
//!
//! Plans describe cohorts with a small predicate grammar:
//! - Predicates: `{col: score, op: ">=", val: 26}`
//! - Operators: `==`, `!=`, `>`, `>=`, `<`, `<=`, `in`, `not_in`, `between`
//! - Combinators: `{and: [...]}`, `{or: [...]}`, `{not: {...}}`
//!
//! `{and: []}` selects every row and `{or: []}` selects none. A missing cell
//! fails every predicate except `!=` and `not_in`, which it satisfies.

use crate::dataset::{ColumnData, ColumnKind, Dataset};
use crate::error::{EvidenceError, FieldError, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Between,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            "in" => FilterOp::In,
            "not_in" => FilterOp::NotIn,
            "between" => FilterOp::Between,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
            FilterOp::Between => "between",
        }
    }

    fn is_ordered(self) -> bool {
        matches!(
            self,
            FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le | FilterOp::Between
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar literal on the right-hand side of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Literal {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Literal::Number),
            Value::String(s) => Some(Literal::Text(s.clone())),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Literal::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::Text(s) => Value::String(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }

    fn compatible_with(&self, kind: ColumnKind) -> bool {
        matches!(
            (self, kind),
            (Literal::Number(_), ColumnKind::Numeric)
                | (Literal::Text(_), ColumnKind::Categorical)
                | (Literal::Bool(_), ColumnKind::Flag)
        )
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Literal::Number(_) => "numeric",
            Literal::Text(_) => "text",
            Literal::Bool(_) => "boolean",
        }
    }
}

/// Right-hand side of a predicate, shaped by its operator
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Literal),
    Set(Vec<Literal>),
    Range { low: Literal, high: Literal },
}

impl Operand {
    fn literals(&self) -> Vec<&Literal> {
        match self {
            Operand::Scalar(lit) => vec![lit],
            Operand::Set(set) => set.iter().collect(),
            Operand::Range { low, high } => vec![low, high],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: FilterOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Combinator {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

/// Parsed, immutable cohort filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Predicate(Predicate),
    Combinator(Combinator),
}

impl FilterNode {
    pub fn predicate(column: impl Into<String>, op: FilterOp, operand: Operand) -> Self {
        FilterNode::Predicate(Predicate {
            column: column.into(),
            op,
            operand,
        })
    }

    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::Combinator(Combinator::And(children))
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Combinator(Combinator::Or(children))
    }

    pub fn negate(child: FilterNode) -> Self {
        FilterNode::Combinator(Combinator::Not(Box::new(child)))
    }

    /// Parse a filter document, collecting every problem under `path`
    pub fn from_json(value: &Value, path: &str) -> Result<Self> {
        let doc: FilterDoc = serde_json::from_value(value.clone())
            .map_err(|e| EvidenceError::config(path, e.to_string()))?;
        let mut errors = Vec::new();
        match doc.parse(path, &mut errors) {
            Some(node) if errors.is_empty() => Ok(node),
            _ => Err(EvidenceError::Configuration(errors)),
        }
    }

    pub fn to_doc(&self) -> FilterDoc {
        match self {
            FilterNode::Predicate(p) => FilterDoc {
                col: Some(p.column.clone()),
                op: Some(p.op.as_str().to_string()),
                val: Some(match &p.operand {
                    Operand::Scalar(lit) => lit.to_json(),
                    Operand::Set(set) => Value::Array(set.iter().map(Literal::to_json).collect()),
                    Operand::Range { low, high } => {
                        Value::Array(vec![low.to_json(), high.to_json()])
                    }
                }),
                ..FilterDoc::default()
            },
            FilterNode::Combinator(Combinator::And(children)) => FilterDoc {
                and: Some(children.iter().map(FilterNode::to_doc).collect()),
                ..FilterDoc::default()
            },
            FilterNode::Combinator(Combinator::Or(children)) => FilterDoc {
                or: Some(children.iter().map(FilterNode::to_doc).collect()),
                ..FilterDoc::default()
            },
            FilterNode::Combinator(Combinator::Not(child)) => FilterDoc {
                not: Some(NotDoc::One(Box::new(child.to_doc()))),
                ..FilterDoc::default()
            },
        }
    }

    /// Check referenced columns and operand kinds against a dataset
    pub fn validate(&self, dataset: &Dataset, path: &str, errors: &mut Vec<FieldError>) {
        match self {
            FilterNode::Predicate(p) => match dataset.column(&p.column) {
                None => errors.push(FieldError::new(
                    format!("{path}.col"),
                    format!("unknown column {}", p.column),
                )),
                Some(column) => {
                    if let Some(message) = p.kind_mismatch(column.kind()) {
                        errors.push(FieldError::new(format!("{path}.val"), message));
                    }
                }
            },
            FilterNode::Combinator(Combinator::And(children)) => {
                for (i, child) in children.iter().enumerate() {
                    child.validate(dataset, &format!("{path}.and[{i}]"), errors);
                }
            }
            FilterNode::Combinator(Combinator::Or(children)) => {
                for (i, child) in children.iter().enumerate() {
                    child.validate(dataset, &format!("{path}.or[{i}]"), errors);
                }
            }
            FilterNode::Combinator(Combinator::Not(child)) => {
                child.validate(dataset, &format!("{path}.not"), errors);
            }
        }
    }
}

impl Serialize for FilterNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_doc().serialize(serializer)
    }
}

/// Row selection produced by evaluating a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMask(Vec<bool>);

impl RowMask {
    pub fn all(rows: usize) -> Self {
        RowMask(vec![true; rows])
    }

    pub fn none(rows: usize) -> Self {
        RowMask(vec![false; rows])
    }

    pub fn from_bools(bits: Vec<bool>) -> Self {
        RowMask(bits)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of selected rows
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    /// Indices of selected rows, ascending
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    fn and_with(&mut self, other: &RowMask) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a &= *b;
        }
    }

    fn or_with(&mut self, other: &RowMask) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    fn negated(mut self) -> Self {
        for bit in &mut self.0 {
            *bit = !*bit;
        }
        self
    }
}

/// Evaluate a filter tree against every row of a dataset
pub fn evaluate(dataset: &Dataset, node: &FilterNode) -> Result<RowMask> {
    let rows = dataset.n_rows();
    match node {
        FilterNode::Predicate(p) => p.evaluate(dataset),
        FilterNode::Combinator(Combinator::And(children)) => {
            let mut mask = RowMask::all(rows);
            for child in children {
                mask.and_with(&evaluate(dataset, child)?);
            }
            Ok(mask)
        }
        FilterNode::Combinator(Combinator::Or(children)) => {
            let mut mask = RowMask::none(rows);
            for child in children {
                mask.or_with(&evaluate(dataset, child)?);
            }
            Ok(mask)
        }
        FilterNode::Combinator(Combinator::Not(child)) => Ok(evaluate(dataset, child)?.negated()),
    }
}

enum Cell<'a> {
    Number(f64),
    Text(&'a str),
    Bool(bool),
}

fn cell_at(column: &ColumnData, row: usize) -> Option<Cell<'_>> {
    match column {
        ColumnData::Numeric(v) => v[row].map(Cell::Number),
        ColumnData::Categorical(v) => v[row].as_deref().map(Cell::Text),
        ColumnData::Flag(v) => v[row].map(Cell::Bool),
    }
}

/// `None` when the cell and literal kinds cannot be compared
fn compare(cell: &Cell<'_>, literal: &Literal) -> Option<Ordering> {
    match (cell, literal) {
        (Cell::Number(a), Literal::Number(b)) => a.partial_cmp(b),
        (Cell::Text(a), Literal::Text(b)) => Some((*a).cmp(b.as_str())),
        (Cell::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl Predicate {
    /// Ordered comparisons need a literal of the column's own kind
    fn kind_mismatch(&self, kind: ColumnKind) -> Option<String> {
        if !self.op.is_ordered() {
            return None;
        }
        self.operand
            .literals()
            .into_iter()
            .find(|lit| !lit.compatible_with(kind))
            .map(|lit| {
                format!(
                    "operator {} cannot compare {:?} column {} with a {} value",
                    self.op,
                    kind,
                    self.column,
                    lit.kind_name()
                )
            })
    }

    fn evaluate(&self, dataset: &Dataset) -> Result<RowMask> {
        let column = dataset
            .column(&self.column)
            .ok_or_else(|| EvidenceError::config("col", format!("unknown column {}", self.column)))?;
        if let Some(message) = self.kind_mismatch(column.kind()) {
            return Err(EvidenceError::config("val", message));
        }

        let bits = (0..dataset.n_rows())
            .map(|row| match cell_at(column, row) {
                None => matches!(self.op, FilterOp::Ne | FilterOp::NotIn),
                Some(cell) => self.matches(&cell),
            })
            .collect();
        Ok(RowMask::from_bools(bits))
    }

    fn matches(&self, cell: &Cell<'_>) -> bool {
        let equals = |lit: &Literal| compare(cell, lit) == Some(Ordering::Equal);
        match (&self.operand, self.op) {
            (Operand::Scalar(lit), FilterOp::Eq) => equals(lit),
            (Operand::Scalar(lit), FilterOp::Ne) => !equals(lit),
            (Operand::Scalar(lit), FilterOp::Gt) => compare(cell, lit) == Some(Ordering::Greater),
            (Operand::Scalar(lit), FilterOp::Ge) => matches!(
                compare(cell, lit),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (Operand::Scalar(lit), FilterOp::Lt) => compare(cell, lit) == Some(Ordering::Less),
            (Operand::Scalar(lit), FilterOp::Le) => {
                matches!(compare(cell, lit), Some(Ordering::Less | Ordering::Equal))
            }
            (Operand::Set(set), FilterOp::In) => set.iter().any(equals),
            (Operand::Set(set), FilterOp::NotIn) => !set.iter().any(equals),
            (Operand::Range { low, high }, FilterOp::Between) => {
                matches!(compare(cell, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(cell, high), Some(Ordering::Less | Ordering::Equal))
            }
            // parse() pairs each operator with exactly one operand shape
            _ => false,
        }
    }
}

/// Serialized shape of a filter as it appears in plan documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<FilterDoc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<FilterDoc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<NotDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,
}

/// `not` takes one filter; a list form is accepted only with one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotDoc {
    Many(Vec<FilterDoc>),
    One(Box<FilterDoc>),
}

impl FilterDoc {
    /// Convert to a typed tree, pushing one error per malformed node
    pub fn parse(&self, path: &str, errors: &mut Vec<FieldError>) -> Option<FilterNode> {
        let is_predicate = self.col.is_some() || self.op.is_some() || self.val.is_some();
        let forms = [self.and.is_some(), self.or.is_some(), self.not.is_some(), is_predicate]
            .iter()
            .filter(|&&set| set)
            .count();
        if forms != 1 {
            errors.push(FieldError::new(
                path,
                "filter must be exactly one of `and`, `or`, `not`, or a `col`/`op`/`val` predicate",
            ));
            return None;
        }

        if let Some(children) = &self.and {
            return parse_children(children, &format!("{path}.and"), errors)
                .map(FilterNode::and);
        }
        if let Some(children) = &self.or {
            return parse_children(children, &format!("{path}.or"), errors).map(FilterNode::or);
        }
        if let Some(not) = &self.not {
            return match not {
                NotDoc::One(child) => child
                    .parse(&format!("{path}.not"), errors)
                    .map(FilterNode::negate),
                NotDoc::Many(children) if children.len() == 1 => children[0]
                    .parse(&format!("{path}.not[0]"), errors)
                    .map(FilterNode::negate),
                NotDoc::Many(children) => {
                    errors.push(FieldError::new(
                        format!("{path}.not"),
                        format!("not requires exactly one child, got {}", children.len()),
                    ));
                    None
                }
            };
        }
        self.parse_predicate(path, errors)
    }

    fn parse_predicate(&self, path: &str, errors: &mut Vec<FieldError>) -> Option<FilterNode> {
        let before = errors.len();
        let column = self.col.clone();
        if column.is_none() {
            errors.push(FieldError::new(format!("{path}.col"), "col is required"));
        }

        let op = match self.op.as_deref() {
            None => {
                errors.push(FieldError::new(
                    format!("{path}.op"),
                    "op required when col provided",
                ));
                None
            }
            Some(raw) => {
                let op = FilterOp::parse(raw);
                if op.is_none() {
                    errors.push(FieldError::new(
                        format!("{path}.op"),
                        format!("unknown operator {raw:?}"),
                    ));
                }
                op
            }
        };

        let operand = match (op, self.val.as_ref()) {
            (_, None) => {
                errors.push(FieldError::new(format!("{path}.val"), "val is required"));
                None
            }
            (None, Some(_)) => None,
            (Some(op), Some(val)) => match parse_operand(op, val) {
                Ok(operand) => Some(operand),
                Err(message) => {
                    errors.push(FieldError::new(format!("{path}.val"), message));
                    None
                }
            },
        };

        if errors.len() != before {
            return None;
        }
        Some(FilterNode::Predicate(Predicate {
            column: column?,
            op: op?,
            operand: operand?,
        }))
    }
}

fn parse_children(
    children: &[FilterDoc],
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<FilterNode>> {
    let parsed: Vec<Option<FilterNode>> = children
        .iter()
        .enumerate()
        .map(|(i, child)| child.parse(&format!("{path}[{i}]"), errors))
        .collect();
    parsed.into_iter().collect()
}

fn parse_operand(op: FilterOp, val: &Value) -> std::result::Result<Operand, String> {
    let literal = |v: &Value| {
        Literal::from_json(v).ok_or_else(|| format!("unsupported literal {v} for operator {op}"))
    };

    match op {
        FilterOp::In | FilterOp::NotIn => match val {
            Value::Array(items) => items
                .iter()
                .map(literal)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Operand::Set),
            scalar => literal(scalar).map(|lit| Operand::Set(vec![lit])),
        },
        FilterOp::Between => match val {
            Value::Array(items) if items.len() == 2 => {
                let low = literal(&items[0])?;
                let high = literal(&items[1])?;
                if std::mem::discriminant(&low) != std::mem::discriminant(&high) {
                    return Err("between bounds must have the same type".to_string());
                }
                Ok(Operand::Range { low, high })
            }
            _ => Err("between requires a two-element [low, high] list".to_string()),
        },
        _ => match val {
            Value::Array(_) => Err(format!("operator {op} requires a scalar value")),
            scalar => literal(scalar).map(Operand::Scalar),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> Dataset {
        Dataset::from_columns([
            ("a", ColumnData::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)])),
            ("b", ColumnData::Numeric(vec![Some(4.0), Some(5.0), Some(6.0)])),
            (
                "sex",
                ColumnData::Categorical(vec![Some("F".into()), None, Some("M".into())]),
            ),
            ("flag", ColumnData::Flag(vec![Some(true), Some(false), None])),
        ])
        .unwrap()
    }

    fn eval(value: Value) -> Vec<bool> {
        let node = FilterNode::from_json(&value, "filter").unwrap();
        evaluate(&frame(), &node).unwrap().bits().to_vec()
    }

    #[test]
    fn test_and_or_not() {
        let mask = eval(json!({
            "and": [
                {"col": "a", "op": ">", "val": 1},
                {"not": {"col": "b", "op": "==", "val": 5}}
            ]
        }));
        assert_eq!(mask, vec![false, false, true]);
    }

    #[test]
    fn test_empty_and_selects_all() {
        assert_eq!(eval(json!({"and": []})), vec![true, true, true]);
    }

    #[test]
    fn test_empty_or_selects_none() {
        assert_eq!(eval(json!({"or": []})), vec![false, false, false]);
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(eval(json!({"col": "a", "op": ">=", "val": 2})), vec![false, true, true]);
        assert_eq!(eval(json!({"col": "a", "op": "<", "val": 2})), vec![true, false, false]);
        assert_eq!(eval(json!({"col": "a", "op": "<=", "val": 2})), vec![true, true, false]);
        assert_eq!(eval(json!({"col": "a", "op": "!=", "val": 2})), vec![true, false, true]);
    }

    #[test]
    fn test_in_accepts_scalar_and_list() {
        assert_eq!(eval(json!({"col": "a", "op": "in", "val": 2})), vec![false, true, false]);
        assert_eq!(
            eval(json!({"col": "a", "op": "in", "val": [1, 3]})),
            vec![true, false, true]
        );
        assert_eq!(
            eval(json!({"col": "a", "op": "not_in", "val": [1, 3]})),
            vec![false, true, false]
        );
    }

    #[test]
    fn test_between_is_inclusive() {
        assert_eq!(
            eval(json!({"col": "b", "op": "between", "val": [4, 5]})),
            vec![true, true, false]
        );
    }

    #[test]
    fn test_missing_cells_follow_pandas_semantics() {
        assert_eq!(eval(json!({"col": "sex", "op": "==", "val": "F"})), vec![true, false, false]);
        assert_eq!(eval(json!({"col": "sex", "op": "!=", "val": "F"})), vec![false, true, true]);
        assert_eq!(
            eval(json!({"col": "flag", "op": "not_in", "val": [true]})),
            vec![false, true, true]
        );
    }

    #[test]
    fn test_cross_kind_equality_never_matches() {
        assert_eq!(eval(json!({"col": "a", "op": "==", "val": "1"})), vec![false, false, false]);
    }

    #[test]
    fn test_cross_kind_ordering_is_configuration_error() {
        let node = FilterNode::from_json(&json!({"col": "sex", "op": ">", "val": 3}), "f").unwrap();
        assert!(matches!(
            evaluate(&frame(), &node),
            Err(EvidenceError::Configuration(_))
        ));

        let mut errors = Vec::new();
        node.validate(&frame(), "cohorts.baseline", &mut errors);
        assert_eq!(errors[0].field, "cohorts.baseline.val");
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = FilterNode::from_json(&json!({"col": "a", "op": "like", "val": 1}), "c")
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "c.op");
        assert!(err.to_string().contains("unknown operator"));
    }

    #[test]
    fn test_not_arity_enforced() {
        let err = FilterNode::from_json(&json!({"not": []}), "c").unwrap_err();
        assert!(err.to_string().contains("exactly one child, got 0"));

        let two = json!({"not": [{"and": []}, {"or": []}]});
        assert!(FilterNode::from_json(&two, "c").is_err());

        let one = json!({"not": [{"or": []}]});
        let node = FilterNode::from_json(&one, "c").unwrap();
        assert_eq!(evaluate(&frame(), &node).unwrap().count(), 3);
    }

    #[test]
    fn test_between_requires_pair() {
        let err = FilterNode::from_json(&json!({"col": "a", "op": "between", "val": [1]}), "c")
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "c.val");
    }

    #[test]
    fn test_op_required_with_col() {
        let err = FilterNode::from_json(&json!({"col": "a", "val": 1}), "c").unwrap_err();
        assert!(err.to_string().contains("op required"));
    }

    #[test]
    fn test_mixed_forms_rejected() {
        let err = FilterNode::from_json(&json!({"and": [], "col": "a"}), "c").unwrap_err();
        assert_eq!(err.field_errors()[0].field, "c");
    }

    #[test]
    fn test_nested_errors_are_all_reported() {
        let doc = json!({"or": [
            {"col": "a", "op": "~", "val": 1},
            {"and": [{"col": "b", "op": "between", "val": 3}]}
        ]});
        let err = FilterNode::from_json(&doc, "cohorts.proposed").unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["cohorts.proposed.or[0].op", "cohorts.proposed.or[1].and[0].val"]
        );
    }

    #[test]
    fn test_validate_reports_unknown_column_path() {
        let node = FilterNode::from_json(
            &json!({"and": [{"col": "missing", "op": "==", "val": 1}]}),
            "x",
        )
        .unwrap();
        let mut errors = Vec::new();
        node.validate(&frame(), "cohorts.baseline", &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "cohorts.baseline.and[0].col");
    }

    #[test]
    fn test_doc_roundtrip_preserves_semantics() {
        let value = json!({"or": [
            {"col": "sex", "op": "in", "val": "M"},
            {"not": {"col": "a", "op": "between", "val": [2, 3]}}
        ]});
        let node = FilterNode::from_json(&value, "c").unwrap();
        let reparsed = FilterNode::from_json(&serde_json::to_value(&node).unwrap(), "c").unwrap();
        assert_eq!(node, reparsed);
    }

    #[test]
    fn test_row_mask_indices() {
        let mask = RowMask::from_bools(vec![true, false, true]);
        assert_eq!(mask.indices(), vec![0, 2]);
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.len(), 3);
    }
}
