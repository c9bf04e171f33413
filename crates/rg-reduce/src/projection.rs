//! Shape projection for the four {reduce-all, dim list} x {keepdim, squeeze}
//! combinations.

use rg_tensor::Shape;

use crate::axis::{AxisSet, ResolvedAxes};

/// Graph-facing and caller-facing shapes of one reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeProjection {
    pub apparent_input_shape: Shape,
    /// Same rank as `apparent_input_shape`, reduced axes set to 1.
    pub apparent_output_shape: Shape,
    /// The shape the caller sees: reduced axes dropped unless keepdim.
    pub logical_output_shape: Shape,
    /// Product of the sizes of the reduced axes.
    pub correction_n: usize,
}

impl ShapeProjection {
    pub fn output_numel(&self) -> usize {
        self.logical_output_shape.numel()
    }
}

/// Project `input` through `resolved` for the given keepdim flag.
pub fn project(input: &Shape, resolved: &ResolvedAxes, keepdim: bool) -> ShapeProjection {
    let (logical_output_shape, correction_n) = match &resolved.axes {
        AxisSet::All => {
            let logical = if keepdim {
                Shape::new(vec![1; input.ndim()])
            } else {
                Shape::scalar()
            };
            (logical, input.numel())
        }
        AxisSet::Dims(axes) => {
            let correction_n = axes
                .iter()
                .map(|&a| resolved.apparent_input_shape.dim(a))
                .product();
            let logical = if input.ndim() == 0 {
                Shape::scalar()
            } else if keepdim {
                resolved.apparent_output_shape.clone()
            } else {
                let dims = input
                    .dims()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !axes.contains(i))
                    .map(|(_, &d)| d)
                    .collect();
                Shape::new(dims)
            };
            (logical, correction_n)
        }
    };

    ShapeProjection {
        apparent_input_shape: resolved.apparent_input_shape.clone(),
        apparent_output_shape: resolved.apparent_output_shape.clone(),
        logical_output_shape,
        correction_n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::resolve_axes;
    use proptest::prelude::*;

    fn proj(shape: &[usize], dims: Option<&[i64]>, keepdim: bool) -> ShapeProjection {
        let shape = Shape::from_slice(shape);
        let resolved = resolve_axes(&shape, dims).unwrap();
        project(&shape, &resolved, keepdim)
    }

    #[test]
    fn test_reduce_all_squeeze() {
        let p = proj(&[2, 3], None, false);
        assert_eq!(p.apparent_input_shape.dims(), &[6]);
        assert_eq!(p.apparent_output_shape.dims(), &[1]);
        assert_eq!(p.logical_output_shape.dims(), &[] as &[usize]);
        assert_eq!(p.output_numel(), 1);
        assert_eq!(p.correction_n, 6);
    }

    #[test]
    fn test_reduce_all_keepdim() {
        let p = proj(&[2, 3], None, true);
        assert_eq!(p.logical_output_shape.dims(), &[1, 1]);
        assert_eq!(p.correction_n, 6);
    }

    #[test]
    fn test_dims_squeeze() {
        let p = proj(&[2, 3, 4], Some(&[1]), false);
        assert_eq!(p.apparent_input_shape.dims(), &[2, 3, 4]);
        assert_eq!(p.apparent_output_shape.dims(), &[2, 1, 4]);
        assert_eq!(p.logical_output_shape.dims(), &[2, 4]);
        assert_eq!(p.correction_n, 3);
    }

    #[test]
    fn test_dims_keepdim() {
        let p = proj(&[2, 3, 4], Some(&[0, 2]), true);
        assert_eq!(p.apparent_output_shape.dims(), &[1, 3, 1]);
        assert_eq!(p.logical_output_shape.dims(), &[1, 3, 1]);
        assert_eq!(p.correction_n, 8);
    }

    #[test]
    fn test_zero_sized_axis() {
        let p = proj(&[0, 5], Some(&[1]), false);
        assert_eq!(p.logical_output_shape.dims(), &[0]);
        assert_eq!(p.output_numel(), 0);
        assert_eq!(p.correction_n, 5);
    }

    #[test]
    fn test_scalar_keepdim_stays_scalar() {
        let p = proj(&[], Some(&[0]), true);
        assert_eq!(p.logical_output_shape.ndim(), 0);
        assert_eq!(p.correction_n, 1);
    }

    fn shape_and_dims() -> impl Strategy<Value = (Vec<usize>, Option<Vec<i64>>, bool)> {
        prop::collection::vec(0usize..5, 0..5).prop_flat_map(|dims| {
            let rank = dims.len().max(1) as i64;
            let axes = prop::option::of(prop::collection::vec(-rank..rank, 0..4));
            (Just(dims), axes, any::<bool>())
        })
    }

    proptest! {
        #[test]
        fn prop_apparent_output_preserves_rank((dims, axes, keepdim) in shape_and_dims()) {
            let shape = Shape::new(dims.clone());
            let resolved = resolve_axes(&shape, axes.as_deref()).unwrap();
            let p = project(&shape, &resolved, keepdim);

            prop_assert_eq!(p.apparent_input_shape.ndim(), p.apparent_output_shape.ndim());
            let reduced = resolved.axes.graph_axes();
            for (i, (&a, &o)) in p
                .apparent_input_shape
                .dims()
                .iter()
                .zip(p.apparent_output_shape.dims())
                .enumerate()
            {
                if reduced.contains(&i) {
                    prop_assert_eq!(o, 1);
                } else {
                    prop_assert_eq!(o, a);
                }
            }

            let reduced_numel: usize =
                reduced.iter().map(|&a| p.apparent_input_shape.dim(a)).product();
            prop_assert_eq!(p.correction_n, reduced_numel);
            if p.correction_n > 0 {
                prop_assert_eq!(p.apparent_input_shape.numel() / p.correction_n, p.output_numel());
            }
            if keepdim {
                prop_assert_eq!(p.logical_output_shape.ndim(), shape.ndim());
            }
        }
    }
}
