//! Backward operation trait for reverse-mode differentiation

/// A recorded operation that can propagate gradients to its inputs.
///
/// Each differentiable op attaches one of these to its result tensor. Calling
/// `backward` reads the result's gradient cell, accumulates gradients into the
/// op's inputs, then recurses into the inputs' own backward ops. Graphs are
/// trees over interior nodes; parameters appear only as leaves, so shared
/// parameters accumulate correctly without revisiting subgraphs.
pub trait BackwardOp {
    /// Propagate the result gradient to this op's inputs.
    fn backward(&self);
}
