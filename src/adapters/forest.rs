//! Gradient-boosted tree ensemble with path attribution.
//!
//! Trees use the XGBoost split convention: go to `yes` when
//! `x[feature] < threshold`, otherwise `no`. Leaves hold margin (log-odds)
//! increments; the probability is `sigmoid(base_margin + sum(leaves))`.
//!
//! Attribution follows the decision path of each tree: every split credits
//! its feature with the change in cover-weighted expected value between the
//! node and the child taken. Summed over trees, base value plus contributions
//! equals the margin exactly.

use serde::{Deserialize, Serialize};

use crate::domain::{Attribution, FeatureContribution, FeatureVector};
use crate::ports::{Classifier, ClassifierError, ExplainError, Explainer};

use super::bundle_fs::BundleError;
use super::linear::sigmoid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeArtifact {
    Split {
        feature: String,
        threshold: f64,
        yes: usize,
        no: usize,
        cover: f64,
    },
    Leaf {
        leaf: f64,
        cover: f64,
    },
}

impl NodeArtifact {
    fn cover(&self) -> f64 {
        match self {
            Self::Split { cover, .. } | Self::Leaf { cover, .. } => *cover,
        }
    }
}

/// One tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub nodes: Vec<NodeArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsembleArtifact {
    #[serde(default)]
    pub base_margin: f64,
    pub trees: Vec<TreeArtifact>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
    },
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
    /// Cover-weighted mean of the leaves below each node.
    expected: Vec<f64>,
}

impl Tree {
    fn compile(artifact: &TreeArtifact, feature_order: &[String]) -> Result<Self, BundleError> {
        let n = artifact.nodes.len();
        if n == 0 {
            return Err(BundleError::Invalid("tree has no nodes".into()));
        }

        let mut nodes = Vec::with_capacity(n);
        for (i, node) in artifact.nodes.iter().enumerate() {
            let compiled = match node {
                NodeArtifact::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    ..
                } => {
                    // Children after parents keeps every tree acyclic.
                    if *yes <= i || *no <= i || *yes >= n || *no >= n {
                        return Err(BundleError::Invalid(format!(
                            "node {i} has out-of-order children {yes}/{no}"
                        )));
                    }
                    let index = feature_order.iter().position(|f| f == feature).ok_or_else(
                        || BundleError::Invalid(format!("split on unknown feature {feature}")),
                    )?;
                    Node::Split {
                        feature: index,
                        threshold: *threshold,
                        yes: *yes,
                        no: *no,
                    }
                }
                NodeArtifact::Leaf { leaf, .. } => Node::Leaf(*leaf),
            };
            nodes.push(compiled);
        }

        let mut expected = vec![0.0; n];
        for i in (0..n).rev() {
            expected[i] = match nodes[i] {
                Node::Leaf(value) => value,
                Node::Split { yes, no, .. } => {
                    let (cy, cn) = (artifact.nodes[yes].cover(), artifact.nodes[no].cover());
                    if cy + cn > 0.0 {
                        (cy * expected[yes] + cn * expected[no]) / (cy + cn)
                    } else {
                        (expected[yes] + expected[no]) / 2.0
                    }
                }
            };
        }

        Ok(Self { nodes, expected })
    }

    /// Walk to a leaf, reporting each (split feature, from node, to node) step.
    fn walk(&self, x: &[f64], mut on_step: impl FnMut(usize, usize, usize)) -> f64 {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                } => {
                    let next = if x[feature] < threshold { yes } else { no };
                    on_step(feature, at, next);
                    at = next;
                }
            }
        }
    }
}

/// Tree ensemble compiled against a fixed feature order.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_margin: f64,
    num_features: usize,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// # Errors
    /// Returns `BundleError::Invalid` for malformed trees or unknown features.
    pub fn compile(
        artifact: &TreeEnsembleArtifact,
        feature_order: &[String],
    ) -> Result<Self, BundleError> {
        let trees = artifact
            .trees
            .iter()
            .map(|t| Tree::compile(t, feature_order))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            base_margin: artifact.base_margin,
            num_features: feature_order.len(),
            trees,
        })
    }

    fn check_len(&self, features: &FeatureVector) -> Result<(), ClassifierError> {
        if features.len() != self.num_features {
            return Err(ClassifierError::FeatureCount {
                expected: self.num_features,
                actual: features.len(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn margin(&self, x: &[f64]) -> f64 {
        self.base_margin
            + self
                .trees
                .iter()
                .map(|t| t.walk(x, |_, _, _| {}))
                .sum::<f64>()
    }
}

impl Classifier for TreeEnsemble {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64, ClassifierError> {
        self.check_len(features)?;
        let p = sigmoid(self.margin(features.values()));
        if p.is_finite() {
            Ok(p)
        } else {
            Err(ClassifierError::NonFinite)
        }
    }
}

impl Explainer for TreeEnsemble {
    fn explain(&self, features: &FeatureVector) -> Result<Attribution, ExplainError> {
        self.check_len(features)
            .map_err(|e| ExplainError::Failed(e.to_string()))?;

        let x = features.values();
        let mut contributions = vec![0.0; self.num_features];
        let mut base_value = self.base_margin;
        let mut margin = self.base_margin;

        for tree in &self.trees {
            base_value += tree.expected[0];
            margin += tree.walk(x, |feature, from, to| {
                contributions[feature] += tree.expected[to] - tree.expected[from];
            });
        }

        Ok(Attribution {
            base_value,
            margin,
            contributions: features
                .names()
                .iter()
                .zip(x)
                .zip(contributions)
                .map(|((name, &value), contribution)| FeatureContribution {
                    feature: name.clone(),
                    value,
                    contribution,
                })
                .collect(),
        })
    }
}
