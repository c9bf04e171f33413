//! A small SSA dataflow IR for reduction graphs.
//!
//! Nodes are appended in topological order by [`GraphBuilder`], which infers
//! every node's dtype and shape as it goes. A finished [`Graph`] is immutable
//! and is what the cache stores and the compute stream executes.

use rg_tensor::{DType, Shape};

use crate::error::{ReduceError, Result};

/// Index of a node inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Abs,
    Sqrt,
    /// `x != 0`, producing Bool.
    NotZero,
    /// Replaces NaN with 0.
    NanToZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Sub,
    Mul,
    Pow,
}

/// Reduction primitives. Results keep the reduced axes at size 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceKind {
    Sum,
    Prod,
    Mean,
    Max,
    Min,
    /// Logical OR of `x != 0`, as 0/1 in the operand dtype.
    Or,
    /// Logical AND of `x != 0`, as 0/1 in the operand dtype.
    And,
    /// Biased (population) variance.
    Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Placeholder { name: String },
    /// Rank-0 constant of the node dtype.
    Constant(f64),
    Cast,
    Unary(UnaryOp),
    /// Elementwise with numpy broadcasting.
    Binary(BinaryOp),
    Reduce { kind: ReduceKind, axes: Vec<usize> },
    /// Index of the extremum along `axis` (I64, axis kept at size 1).
    /// Ties resolve to the first occurrence; NaN counts as the extremum.
    ArgReduce { kind: ArgKind, axis: usize },
    /// Zeroes everything off the main diagonal of a rank-2 operand.
    DiagonalBand,
    /// Stable ascending sort along `axis`, NaN last.
    Sort { axis: usize },
    /// Permutation indices of [`Op::Sort`] (I64).
    ArgSort { axis: usize },
    Slice { axis: usize, start: usize, len: usize },
    Reshape,
    BroadcastTo,
    Clamp { min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub op: Op,
    pub operands: Vec<NodeId>,
    pub dtype: DType,
    pub shape: Shape,
}

/// A named input or output of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub node: NodeId,
    pub dtype: DType,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    inputs: Vec<Placeholder>,
    outputs: Vec<Placeholder>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn inputs(&self) -> &[Placeholder] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Placeholder] {
        &self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&Placeholder> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Placeholder> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// True if any node uses a sort-based primitive.
    pub fn uses_sort(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| matches!(n.op, Op::Sort { .. } | Op::ArgSort { .. }))
    }
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    inputs: Vec<Placeholder>,
    outputs: Vec<Placeholder>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dtype(&self, id: NodeId) -> DType {
        self.nodes[id.index()].dtype
    }

    pub fn shape(&self, id: NodeId) -> &Shape {
        &self.nodes[id.index()].shape
    }

    fn push(&mut self, op: Op, operands: Vec<NodeId>, dtype: DType, shape: Shape) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            op,
            operands,
            dtype,
            shape,
        });
        id
    }

    fn check_axis(&self, x: NodeId, axis: usize, what: &str) -> Result<()> {
        let rank = self.shape(x).ndim();
        if axis >= rank {
            return Err(ReduceError::internal(format!(
                "{}: axis {} out of range for rank {}",
                what, axis, rank
            )));
        }
        Ok(())
    }

    pub fn placeholder(&mut self, name: &str, dtype: DType, shape: Shape) -> NodeId {
        let id = self.push(
            Op::Placeholder {
                name: name.to_string(),
            },
            vec![],
            dtype,
            shape.clone(),
        );
        self.inputs.push(Placeholder {
            name: name.to_string(),
            node: id,
            dtype,
            shape,
        });
        id
    }

    pub fn constant(&mut self, value: f64, dtype: DType) -> NodeId {
        self.push(Op::Constant(value), vec![], dtype, Shape::scalar())
    }

    /// Cast `x` to `dtype`; returns `x` itself when it already has that dtype.
    pub fn cast(&mut self, x: NodeId, dtype: DType) -> NodeId {
        if self.dtype(x) == dtype {
            return x;
        }
        let shape = self.shape(x).clone();
        self.push(Op::Cast, vec![x], dtype, shape)
    }

    pub fn unary(&mut self, op: UnaryOp, x: NodeId) -> NodeId {
        let dtype = match op {
            UnaryOp::NotZero => DType::Bool,
            _ => self.dtype(x),
        };
        let shape = self.shape(x).clone();
        self.push(Op::Unary(op), vec![x], dtype, shape)
    }

    pub fn binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> Result<NodeId> {
        if self.dtype(a) != self.dtype(b) {
            return Err(ReduceError::internal(format!(
                "{:?}: operand dtypes differ ({} vs {})",
                op,
                self.dtype(a),
                self.dtype(b)
            )));
        }
        let shape = Shape::broadcast_shape(self.shape(a), self.shape(b))?;
        let dtype = self.dtype(a);
        Ok(self.push(Op::Binary(op), vec![a, b], dtype, shape))
    }

    pub fn reduce(&mut self, kind: ReduceKind, x: NodeId, axes: &[usize]) -> Result<NodeId> {
        if axes.is_empty() || axes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ReduceError::internal(format!(
                "reduce {:?}: axes {:?} are not ascending and unique",
                kind, axes
            )));
        }
        for &axis in axes {
            self.check_axis(x, axis, "reduce")?;
        }
        let shape = crate::axis::reduced_shape(self.shape(x), axes);
        let dtype = self.dtype(x);
        Ok(self.push(
            Op::Reduce {
                kind,
                axes: axes.to_vec(),
            },
            vec![x],
            dtype,
            shape,
        ))
    }

    pub fn arg_reduce(&mut self, kind: ArgKind, x: NodeId, axis: usize) -> Result<NodeId> {
        self.check_axis(x, axis, "arg_reduce")?;
        let shape = crate::axis::reduced_shape(self.shape(x), &[axis]);
        Ok(self.push(Op::ArgReduce { kind, axis }, vec![x], DType::I64, shape))
    }

    pub fn diagonal_band(&mut self, x: NodeId) -> Result<NodeId> {
        if self.shape(x).ndim() != 2 {
            return Err(ReduceError::internal(format!(
                "diagonal_band: expected rank 2, got {}",
                self.shape(x)
            )));
        }
        let (dtype, shape) = (self.dtype(x), self.shape(x).clone());
        Ok(self.push(Op::DiagonalBand, vec![x], dtype, shape))
    }

    pub fn sort(&mut self, x: NodeId, axis: usize) -> Result<NodeId> {
        self.check_axis(x, axis, "sort")?;
        let (dtype, shape) = (self.dtype(x), self.shape(x).clone());
        Ok(self.push(Op::Sort { axis }, vec![x], dtype, shape))
    }

    pub fn argsort(&mut self, x: NodeId, axis: usize) -> Result<NodeId> {
        self.check_axis(x, axis, "argsort")?;
        let shape = self.shape(x).clone();
        Ok(self.push(Op::ArgSort { axis }, vec![x], DType::I64, shape))
    }

    pub fn slice(&mut self, x: NodeId, axis: usize, start: usize, len: usize) -> Result<NodeId> {
        self.check_axis(x, axis, "slice")?;
        let size = self.shape(x).dim(axis);
        if start + len > size {
            return Err(ReduceError::internal(format!(
                "slice [{}, {}) exceeds axis {} of size {}",
                start,
                start + len,
                axis,
                size
            )));
        }
        let mut dims = self.shape(x).dims().to_vec();
        dims[axis] = len;
        let dtype = self.dtype(x);
        Ok(self.push(
            Op::Slice { axis, start, len },
            vec![x],
            dtype,
            Shape::new(dims),
        ))
    }

    pub fn reshape(&mut self, x: NodeId, shape: Shape) -> Result<NodeId> {
        if self.shape(x).numel() != shape.numel() {
            return Err(ReduceError::internal(format!(
                "reshape {} -> {} changes element count",
                self.shape(x),
                shape
            )));
        }
        if self.shape(x) == &shape {
            return Ok(x);
        }
        let dtype = self.dtype(x);
        Ok(self.push(Op::Reshape, vec![x], dtype, shape))
    }

    pub fn broadcast_to(&mut self, x: NodeId, shape: Shape) -> Result<NodeId> {
        let target = Shape::broadcast_shape(self.shape(x), &shape)?;
        if target != shape {
            return Err(ReduceError::internal(format!(
                "cannot broadcast {} to {}",
                self.shape(x),
                shape
            )));
        }
        let dtype = self.dtype(x);
        Ok(self.push(Op::BroadcastTo, vec![x], dtype, shape))
    }

    pub fn clamp(&mut self, x: NodeId, min: f64, max: f64) -> NodeId {
        let (dtype, shape) = (self.dtype(x), self.shape(x).clone());
        self.push(Op::Clamp { min, max }, vec![x], dtype, shape)
    }

    /// Mark `x` as the graph output `name`.
    pub fn output(&mut self, name: &str, x: NodeId) {
        let node = &self.nodes[x.index()];
        self.outputs.push(Placeholder {
            name: name.to_string(),
            node: x,
            dtype: node.dtype,
            shape: node.shape.clone(),
        });
    }

    pub fn finish(self) -> Result<Graph> {
        if self.outputs.is_empty() {
            return Err(ReduceError::internal("graph has no outputs"));
        }
        Ok(Graph {
            nodes: self.nodes,
            inputs: self.inputs,
            outputs: self.outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_inference() {
        let mut g = GraphBuilder::new();
        let x = g.placeholder("input", DType::F32, Shape::from([2, 3, 4]));
        let r = g.reduce(ReduceKind::Sum, x, &[0, 2]).unwrap();
        assert_eq!(g.shape(r).dims(), &[1, 3, 1]);
        let a = g.arg_reduce(ArgKind::Max, x, 1).unwrap();
        assert_eq!(g.dtype(a), DType::I64);
        assert_eq!(g.shape(a).dims(), &[2, 1, 4]);
        let s = g.slice(x, 2, 1, 2).unwrap();
        assert_eq!(g.shape(s).dims(), &[2, 3, 2]);
    }

    #[test]
    fn test_cast_to_same_dtype_is_identity() {
        let mut g = GraphBuilder::new();
        let x = g.placeholder("input", DType::F32, Shape::from([3]));
        assert_eq!(g.cast(x, DType::F32), x);
        let c = g.cast(x, DType::I32);
        assert_ne!(c, x);
        assert_eq!(g.dtype(c), DType::I32);
    }

    #[test]
    fn test_binary_broadcasts() {
        let mut g = GraphBuilder::new();
        let a = g.placeholder("a", DType::F32, Shape::from([2, 1, 3]));
        let b = g.placeholder("b", DType::F32, Shape::from([1, 4, 3]));
        let d = g.binary(BinaryOp::Sub, a, b).unwrap();
        assert_eq!(g.shape(d).dims(), &[2, 4, 3]);
    }

    #[test]
    fn test_inconsistent_state_is_internal() {
        let mut g = GraphBuilder::new();
        let x = g.placeholder("input", DType::F32, Shape::from([2, 3]));
        let y = g.placeholder("other", DType::I32, Shape::from([2, 3]));
        assert!(matches!(
            g.reduce(ReduceKind::Sum, x, &[2]),
            Err(ReduceError::Internal(_))
        ));
        assert!(matches!(
            g.reduce(ReduceKind::Sum, x, &[1, 0]),
            Err(ReduceError::Internal(_))
        ));
        assert!(matches!(
            g.binary(BinaryOp::Mul, x, y),
            Err(ReduceError::Internal(_))
        ));
        assert!(matches!(
            g.reshape(x, Shape::from([5])),
            Err(ReduceError::Internal(_))
        ));
        assert!(matches!(
            g.slice(x, 1, 2, 2),
            Err(ReduceError::Internal(_))
        ));
    }

    #[test]
    fn test_finish_requires_output() {
        let mut g = GraphBuilder::new();
        g.placeholder("input", DType::F32, Shape::from([2]));
        assert!(g.finish().is_err());
    }

    #[test]
    fn test_named_handles() {
        let mut g = GraphBuilder::new();
        let x = g.placeholder("input", DType::F32, Shape::from([4]));
        let s = g.sort(x, 0).unwrap();
        g.output("values", s);
        let graph = g.finish().unwrap();
        assert_eq!(graph.input("input").unwrap().node, x);
        assert_eq!(graph.output("values").unwrap().shape.dims(), &[4]);
        assert!(graph.output("indices").is_none());
        assert!(graph.uses_sort());
    }
}
