//! Result classifier: from a finished relation to a verdict.
//!
//! A function is unbounded iff no choice assignment falsifies every infinite
//! path, where the infinite paths are those of the final relation together
//! with those the delta graph recorded while closing loops. Otherwise every
//! variable gets the least growth class some admissible assignment achieves
//! for it, and a symbolic [`Bound`] under the first admissible assignment.

use log::debug;

use crate::bound::Bound;
use crate::choice::Choices;
use crate::delta_graph::DeltaGraph;
use crate::error::Result;
use crate::registry::ChoiceRegistry;
use crate::relation::{LabelMatrix, Relation};
use crate::semiring::Label;

/// Growth of one variable in a bounded function.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VariableBound {
    pub name: String,
    /// Least class over all admissible assignments.
    pub growth: Label,
    /// Bound under the reported assignment.
    pub bound: Bound,
}

#[derive(Debug, Clone)]
pub struct Bounded {
    pub relation: Relation,
    pub choices: Choices,
    /// First admissible assignment, indexed by operation.
    pub assignment: Vec<u32>,
    /// The relation under `assignment`.
    pub evaluated: LabelMatrix,
    pub variables: Vec<VariableBound>,
}

#[derive(Debug, Clone)]
pub struct Unbounded {
    /// The final relation, if the function was compiled to the end.
    pub relation: Option<Relation>,
    /// Pairs `(src, dst)` carrying an `i` monomial.
    pub infinite_flows: Vec<(String, String)>,
    /// Per variable, its growth if it can be told apart from the failing
    /// variables (see [`Classifier::classify`]). Empty unless compiled to
    /// the end.
    pub variables: Vec<(String, Option<VariableBound>)>,
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Bounded(Bounded),
    Unbounded(Unbounded),
}

impl Verdict {
    pub fn is_bounded(&self) -> bool {
        matches!(self, Verdict::Bounded(_))
    }
}

/// Least class for which the column is free of anything larger.
const CLASSES: [(Label, Label); 3] = [
    (Label::Zero, Label::Max),
    (Label::Max, Label::Weak),
    (Label::Weak, Label::Poly),
];

pub struct Classifier<'a> {
    relation: &'a Relation,
    registry: &'a ChoiceRegistry,
    limit: usize,
}

impl<'a> Classifier<'a> {
    /// `limit` caps each choice search, see [`Choices::generate`].
    pub fn new(relation: &'a Relation, registry: &'a ChoiceRegistry, limit: usize) -> Self {
        Classifier {
            relation,
            registry,
            limit,
        }
    }

    /// Classifies a relation compiled to the end.
    ///
    /// When the relation is unbounded, variables are still judged one by
    /// one. A variable *fails* when its own column admits no choice. Any
    /// other variable is reported only if, under a choice admissible for
    /// every non-failing column, nothing flows into it from a failing one.
    pub fn classify(&self, delta_graph: &DeltaGraph) -> Result<Verdict> {
        let base = self.base_paths(delta_graph);
        let choices = Choices::from_delta_graph(self.registry, base.clone(), self.limit)?;

        let Some(assignment) = choices.first() else {
            debug!("No admissible choice");
            return Ok(Verdict::Unbounded(Unbounded {
                relation: Some(self.relation.clone()),
                infinite_flows: self.relation.infinite_flows(self.relation.variables()),
                variables: self.partial_verdicts()?,
            }));
        };

        let evaluated = self.relation.apply_choice(&assignment);
        let mut variables = Vec::with_capacity(self.relation.len());
        for (j, name) in self.relation.variables().iter().enumerate() {
            let growth = self.least_class(&base, j)?.unwrap_or(Label::Poly);
            // Admissible assignments never evaluate to `i`.
            let bound = Bound::from_column(&evaluated, j).unwrap_or_default();
            debug!("{}' <= {} ({})", name, bound, growth);
            variables.push(VariableBound {
                name: name.clone(),
                growth,
                bound,
            });
        }

        Ok(Verdict::Bounded(Bounded {
            relation: self.relation.clone(),
            choices,
            assignment,
            evaluated,
            variables,
        }))
    }

    /// Verdict for a compilation stopped early: the delta graph already
    /// proved every choice infinite, and the relation is partial.
    pub fn unbounded_early(&self) -> Verdict {
        Verdict::Unbounded(Unbounded {
            relation: None,
            infinite_flows: self.relation.infinite_flows(self.relation.variables()),
            variables: Vec::new(),
        })
    }

    fn base_paths(&self, delta_graph: &DeltaGraph) -> DeltaGraph {
        let mut paths = delta_graph.clone();
        for p in self.relation.infinite_paths() {
            paths.insert(&p);
        }
        paths
    }

    /// Least class of column `j` under the paths in `base`, or `None` if
    /// `base` alone leaves no admissible assignment.
    fn least_class(&self, base: &DeltaGraph, j: usize) -> Result<Option<Label>> {
        for (class, above) in CLASSES {
            let mut paths = base.clone();
            for p in self.relation.column_paths_at_least(j, above) {
                paths.insert(&p);
            }
            if !Choices::from_delta_graph(self.registry, paths, self.limit)?.is_infinite() {
                return Ok(Some(class));
            }
        }
        let poly = Choices::from_delta_graph(self.registry, base.clone(), self.limit)?;
        Ok(if poly.is_infinite() { None } else { Some(Label::Poly) })
    }

    /// Per-variable verdicts of an unbounded function.
    fn partial_verdicts(&self) -> Result<Vec<(String, Option<VariableBound>)>> {
        let own: Vec<DeltaGraph> = (0..self.relation.len())
            .map(|j| {
                let mut paths = DeltaGraph::new();
                for p in self.relation.column_paths_at_least(j, Label::Infinite) {
                    paths.insert(&p);
                }
                paths
            })
            .collect();

        let mut failing = Vec::new();
        let mut rest = DeltaGraph::new();
        for (j, paths) in own.iter().enumerate() {
            if Choices::from_delta_graph(self.registry, paths.clone(), self.limit)?.is_infinite() {
                failing.push(j);
            } else {
                for p in paths.paths() {
                    rest.insert(p);
                }
            }
        }
        debug!("{} failing variables", failing.len());
        let shared = Choices::from_delta_graph(self.registry, rest, self.limit)?.first();

        let mut result = Vec::with_capacity(self.relation.len());
        for (j, name) in self.relation.variables().iter().enumerate() {
            if failing.contains(&j) {
                result.push((name.clone(), None));
                continue;
            }
            let assignment = match &shared {
                Some(a) => Some(a.clone()),
                None => Choices::from_delta_graph(self.registry, own[j].clone(), self.limit)?.first(),
            };
            let Some(assignment) = assignment else {
                result.push((name.clone(), None));
                continue;
            };
            let evaluated = self.relation.apply_choice(&assignment);
            if failing.iter().any(|&f| evaluated.get(f, j) != Label::Zero) {
                debug!("'{}' depends on a failing variable", name);
                result.push((name.clone(), None));
                continue;
            }
            let growth = self.least_class(&own[j], j)?.unwrap_or(Label::Poly);
            let bound = Bound::from_column(&evaluated, j).unwrap_or_default();
            result.push((
                name.clone(),
                Some(VariableBound {
                    name: name.clone(),
                    growth,
                    bound,
                }),
            ));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::polynomial::Polynomial;
    use crate::registry::OperationKind;
    use crate::types::OpIndex;

    const LIMIT: usize = 10_000;

    /// `y = x + z` over `[x, y, z]`.
    fn sum() -> (Relation, ChoiceRegistry) {
        use Label::*;
        let mut reg = ChoiceRegistry::new();
        let op = reg.new_operation_with_cases(OperationKind::Assignment, 3);
        let mut r = Relation::identity(&["x", "y", "z"]);
        r.replace_column(
            1,
            vec![
                Polynomial::from_cases(op, &[Max, Poly, Weak]),
                Polynomial::zero(),
                Polynomial::from_cases(op, &[Poly, Max, Weak]),
            ],
        );
        (r, reg)
    }

    #[test]
    fn test_bounded_sum() {
        let (r, reg) = sum();
        let verdict = Classifier::new(&r, &reg, LIMIT).classify(&DeltaGraph::new()).unwrap();
        let Verdict::Bounded(b) = verdict else {
            panic!("expected a bounded verdict");
        };
        let growth: Vec<Label> = b.variables.iter().map(|v| v.growth).collect();
        assert_eq!(growth, vec![Label::Max, Label::Weak, Label::Max]);
        assert_eq!(b.assignment, vec![0]);
        assert_eq!(b.variables[1].bound.to_string(), "max(x) + q(z)");
        assert_eq!(b.choices.count_assignments(), 3u32.into());
    }

    #[test]
    fn test_unbounded_with_partial_verdicts() {
        let (mut r, reg) = sum();
        let dg = DeltaGraph::new();
        // Force every case of the operation to be infinite from x to y.
        let forced = Polynomial::from_cases(OpIndex::new(0), &[Label::Infinite; 3]);
        r.set(0, 1, forced);
        let verdict = Classifier::new(&r, &reg, LIMIT).classify(&dg).unwrap();
        let Verdict::Unbounded(u) = verdict else {
            panic!("expected an unbounded verdict");
        };
        assert_eq!(u.infinite_flows, vec![("x".to_string(), "y".to_string())]);
        let growth: Vec<Option<Label>> = u.variables.iter().map(|(_, v)| v.as_ref().map(|v| v.growth)).collect();
        assert_eq!(growth, vec![Some(Label::Max), None, Some(Label::Max)]);
        assert_eq!(u.variables[0].1.as_ref().unwrap().bound.to_string(), "max(x)");
        assert!(u.relation.is_some());
    }

    #[test]
    fn test_flow_from_failing_variable_is_unknown() {
        use Label::*;
        // x -> y is infinite, and z copies y.
        let reg = ChoiceRegistry::new();
        let mut r = Relation::identity(&["x", "y", "z"]);
        r.set(0, 1, Polynomial::constant(Infinite));
        r.set(1, 2, Polynomial::constant(Max));
        let verdict = Classifier::new(&r, &reg, LIMIT).classify(&DeltaGraph::new()).unwrap();
        let Verdict::Unbounded(u) = verdict else {
            panic!("expected an unbounded verdict");
        };
        let known: Vec<&str> = u
            .variables
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(known, vec!["x"]);
        assert_eq!(u.variables[0].1.as_ref().unwrap().growth, Max);
    }

    #[test]
    fn test_delta_graph_paths_count() {
        let (r, reg) = sum();
        let mut dg = DeltaGraph::new();
        dg.insert(&[crate::types::Delta::new(2, 0)]);
        let verdict = Classifier::new(&r, &reg, LIMIT).classify(&dg).unwrap();
        let Verdict::Bounded(b) = verdict else {
            panic!("expected a bounded verdict");
        };
        // Case 2 (`w` from both) is excluded, so y is at best `p`.
        assert_eq!(b.variables[1].growth, Label::Poly);
        assert!(!b.choices.is_valid(&[2]));
    }
}
