use sea_orm::sea_query::{Condition, Expr, SimpleExpr};

use super::subquery::SubqueryNode;
use crate::types::{AssocRelation, ComparisonSpec, CountOp};

/// SQL shape a relation renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateShape {
    Exists,
    NotExists,
    Constant(bool),
    Count(ComparisonSpec),
}

impl AssocRelation {
    pub fn shape(&self) -> PredicateShape {
        match self {
            AssocRelation::Exists => PredicateShape::Exists,
            AssocRelation::NotExists => PredicateShape::NotExists,
            AssocRelation::Count(spec) => spec.shape(),
        }
    }
}

impl ComparisonSpec {
    /// Counts compared against 0 or 1 collapse to EXISTS / NOT EXISTS or a constant.
    pub fn shape(&self) -> PredicateShape {
        match (self.op(), self.threshold()) {
            (CountOp::Gte, 0) => PredicateShape::Constant(true),
            (CountOp::Lt, 0) => PredicateShape::Constant(false),
            (CountOp::Gte, 1) | (CountOp::Gt, 0) | (CountOp::Ne, 0) => PredicateShape::Exists,
            (CountOp::Lt, 1) | (CountOp::Lte, 0) | (CountOp::Eq, 0) => PredicateShape::NotExists,
            _ => PredicateShape::Count(*self),
        }
    }
}

/// Render the final predicate over every expansion of the path.
pub fn build(relation: AssocRelation, nodes: Vec<SubqueryNode>) -> Condition {
    match relation.shape() {
        PredicateShape::Constant(value) => constant(value),
        PredicateShape::Exists => any_exists(nodes).unwrap_or_else(|| constant(false)),
        PredicateShape::NotExists => any_exists(nodes)
            .map(Condition::not)
            .unwrap_or_else(|| constant(true)),
        PredicateShape::Count(spec) => {
            let total = nodes
                .into_iter()
                .map(SubqueryNode::count_expr)
                .reduce(|sum, count| Expr::expr(sum).add(count));
            match total {
                Some(total) => Condition::all().add(compare(total, spec)),
                // Nothing to count
                None => constant(spec.op().evaluate(0, spec.threshold())),
            }
        }
    }
}

fn any_exists(nodes: Vec<SubqueryNode>) -> Option<Condition> {
    if nodes.is_empty() {
        return None;
    }
    Some(nodes.into_iter().fold(Condition::any(), |cond, node| {
        cond.add(Expr::exists(node.exists_statement()))
    }))
}

fn compare(total: SimpleExpr, spec: ComparisonSpec) -> SimpleExpr {
    let lhs = Expr::expr(total);
    let n = spec.threshold();
    match spec.op() {
        CountOp::Lt => lhs.lt(n),
        CountOp::Lte => lhs.lte(n),
        CountOp::Eq => lhs.eq(n),
        CountOp::Gte => lhs.gte(n),
        CountOp::Gt => lhs.gt(n),
        CountOp::Ne => lhs.ne(n),
    }
}

fn constant(value: bool) -> Condition {
    Condition::all().add(Expr::cust(if value { "1 = 1" } else { "1 = 0" }))
}
