//! A module for structured linear operators.
//!
//! Kernel matrices of large training sets are never formed densely in SKIP inference:
//! they are handled through matrix-vector products of the following operators:
//! * [DenseOperator]: plain dense matrix,
//! * [RootOperator]: low rank `R R^T`,
//! * [MatmulOperator]: `A B^T`,
//! * [ShiftedOperator]: operator plus a constant matrix `c 1 1^T`,
//! * [ScaledOperator]: operator times a scalar,
//! * [AddedDiagOperator]: operator plus a diagonal matrix,
//! * [ToeplitzOperator]: symmetric Toeplitz matrix given its first column,
//! * [InterpolatedOperator]: `W_l T W_r^T` with sparse interpolation matrices,
//! * [KroneckerOperator]: `A ⊗ B`,
//! * [HadamardRootOperator]: element-wise product of two roots `(L L^T) ∘ (R R^T)`.

use crate::interpolation::Interpolation;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// A linear operator only known through its products with vectors
pub trait LinearOperator<F: Float>: Send + Sync {
    /// Operator shape (nrows, ncols)
    fn shape(&self) -> (usize, usize);

    /// Product with a vector of size ncols
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F>;

    /// Product with a (ncols, p) matrix, column by column unless specialized
    fn matmul(&self, m: &ArrayView2<F>) -> Array2<F> {
        let mut res = Array2::zeros((self.nrows(), m.ncols()));
        Zip::from(res.columns_mut())
            .and(m.columns())
            .for_each(|mut r, c| r.assign(&self.matvec(&c)));
        res
    }

    /// Dense matrix representation
    fn to_dense(&self) -> Array2<F> {
        self.matmul(&Array2::eye(self.ncols()).view())
    }

    /// Diagonal of the operator
    fn diag(&self) -> Array1<F> {
        self.to_dense().diag().to_owned()
    }

    /// Number of rows
    fn nrows(&self) -> usize {
        self.shape().0
    }

    /// Number of columns
    fn ncols(&self) -> usize {
        self.shape().1
    }
}

/// Dense matrix as a linear operator
#[derive(Clone, Debug, PartialEq)]
pub struct DenseOperator<F: Float>(Array2<F>);

impl<F: Float> DenseOperator<F> {
    /// Wrap given matrix
    pub fn new(matrix: Array2<F>) -> Self {
        DenseOperator(matrix)
    }
}

impl<F: Float> LinearOperator<F> for DenseOperator<F> {
    fn shape(&self) -> (usize, usize) {
        self.0.dim()
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        self.0.dot(v)
    }
    fn matmul(&self, m: &ArrayView2<F>) -> Array2<F> {
        self.0.dot(m)
    }
    fn to_dense(&self) -> Array2<F> {
        self.0.to_owned()
    }
    fn diag(&self) -> Array1<F> {
        self.0.diag().to_owned()
    }
}

/// Symmetric low rank operator `R R^T` with `R` a (n, k) root
#[derive(Clone, Debug, PartialEq)]
pub struct RootOperator<F: Float> {
    root: Array2<F>,
}

impl<F: Float> RootOperator<F> {
    /// Operator from its root
    pub fn new(root: Array2<F>) -> Self {
        RootOperator { root }
    }

    /// The (n, k) root
    pub fn root(&self) -> &Array2<F> {
        &self.root
    }
}

impl<F: Float> LinearOperator<F> for RootOperator<F> {
    fn shape(&self) -> (usize, usize) {
        (self.root.nrows(), self.root.nrows())
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        self.root.dot(&self.root.t().dot(v))
    }
    fn matmul(&self, m: &ArrayView2<F>) -> Array2<F> {
        self.root.dot(&self.root.t().dot(m))
    }
    fn diag(&self) -> Array1<F> {
        (&self.root * &self.root).sum_axis(Axis(1))
    }
}

/// Low rank operator `A B^T` with `A` (n1, k) and `B` (n2, k)
#[derive(Clone, Debug, PartialEq)]
pub struct MatmulOperator<F: Float> {
    left: Array2<F>,
    right: Array2<F>,
}

impl<F: Float> MatmulOperator<F> {
    /// *Panics* if left and right factors do not have the same number of columns
    pub fn new(left: Array2<F>, right: Array2<F>) -> Self {
        assert_eq!(left.ncols(), right.ncols());
        MatmulOperator { left, right }
    }
}

impl<F: Float> LinearOperator<F> for MatmulOperator<F> {
    fn shape(&self) -> (usize, usize) {
        (self.left.nrows(), self.right.nrows())
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        self.left.dot(&self.right.t().dot(v))
    }
    fn matmul(&self, m: &ArrayView2<F>) -> Array2<F> {
        self.left.dot(&self.right.t().dot(m))
    }
    fn diag(&self) -> Array1<F> {
        let n = self.left.nrows().min(self.right.nrows());
        Array1::from_shape_fn(n, |i| self.left.row(i).dot(&self.right.row(i)))
    }
}

/// Operator plus a constant matrix `c 1 1^T`
pub struct ShiftedOperator<F: Float> {
    base: Box<dyn LinearOperator<F>>,
    constant: F,
}

impl<F: Float> ShiftedOperator<F> {
    /// `base + constant * ones`
    pub fn new(base: Box<dyn LinearOperator<F>>, constant: F) -> Self {
        ShiftedOperator { base, constant }
    }
}

impl<F: Float> LinearOperator<F> for ShiftedOperator<F> {
    fn shape(&self) -> (usize, usize) {
        self.base.shape()
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        self.base.matvec(v) + self.constant * v.sum()
    }
    fn diag(&self) -> Array1<F> {
        self.base.diag() + self.constant
    }
}

/// Operator scaled by a constant
pub struct ScaledOperator<F: Float> {
    base: Box<dyn LinearOperator<F>>,
    scale: F,
}

impl<F: Float> ScaledOperator<F> {
    /// `scale * base`
    pub fn new(base: Box<dyn LinearOperator<F>>, scale: F) -> Self {
        ScaledOperator { base, scale }
    }
}

impl<F: Float> LinearOperator<F> for ScaledOperator<F> {
    fn shape(&self) -> (usize, usize) {
        self.base.shape()
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        self.base.matvec(v) * self.scale
    }
    fn matmul(&self, m: &ArrayView2<F>) -> Array2<F> {
        self.base.matmul(m) * self.scale
    }
    fn diag(&self) -> Array1<F> {
        self.base.diag() * self.scale
    }
}

/// Square operator plus a diagonal matrix
pub struct AddedDiagOperator<F: Float> {
    base: Box<dyn LinearOperator<F>>,
    diag: Array1<F>,
}

impl<F: Float> AddedDiagOperator<F> {
    /// *Panics* if base is not square or if diagonal size does not match
    pub fn new(base: Box<dyn LinearOperator<F>>, diag: Array1<F>) -> Self {
        let (nr, nc) = base.shape();
        assert!(nr == nc && nr == diag.len());
        AddedDiagOperator { base, diag }
    }
}

impl<F: Float> LinearOperator<F> for AddedDiagOperator<F> {
    fn shape(&self) -> (usize, usize) {
        self.base.shape()
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        self.base.matvec(v) + &self.diag * v
    }
    fn diag(&self) -> Array1<F> {
        self.base.diag() + &self.diag
    }
}

/// Symmetric Toeplitz matrix `T[i, j] = c[|i - j|]` defined by its first column `c`
#[derive(Clone, Debug, PartialEq)]
pub struct ToeplitzOperator<F: Float> {
    column: Array1<F>,
}

impl<F: Float> ToeplitzOperator<F> {
    /// Toeplitz matrix from its first column
    pub fn new(column: Array1<F>) -> Self {
        ToeplitzOperator { column }
    }

    /// First column
    pub fn column(&self) -> &Array1<F> {
        &self.column
    }
}

impl<F: Float> LinearOperator<F> for ToeplitzOperator<F> {
    fn shape(&self) -> (usize, usize) {
        (self.column.len(), self.column.len())
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        let m = self.column.len();
        Array1::from_shape_fn(m, |i| {
            (0..m).fold(F::zero(), |acc, j| acc + self.column[i.abs_diff(j)] * v[j])
        })
    }
    fn to_dense(&self) -> Array2<F> {
        let m = self.column.len();
        Array2::from_shape_fn((m, m), |(i, j)| self.column[i.abs_diff(j)])
    }
    fn diag(&self) -> Array1<F> {
        Array1::from_elem(self.column.len(), self.column[0])
    }
}

/// Interpolated operator `W_l T W_r^T` where `T` is a grid Toeplitz matrix
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolatedOperator<F: Float> {
    left: Interpolation<F>,
    toeplitz: ToeplitzOperator<F>,
    right: Interpolation<F>,
}

impl<F: Float> InterpolatedOperator<F> {
    /// *Panics* if interpolation grids do not match the Toeplitz size
    pub fn new(left: Interpolation<F>, toeplitz: ToeplitzOperator<F>, right: Interpolation<F>) -> Self {
        assert_eq!(left.grid_size(), toeplitz.nrows());
        assert_eq!(right.grid_size(), toeplitz.nrows());
        InterpolatedOperator {
            left,
            toeplitz,
            right,
        }
    }
}

impl<F: Float> LinearOperator<F> for InterpolatedOperator<F> {
    fn shape(&self) -> (usize, usize) {
        (self.left.n_points(), self.right.n_points())
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        let u = self.right.rmatvec(v);
        self.left.matvec(&self.toeplitz.matvec(&u.view()).view())
    }
    fn to_dense(&self) -> Array2<F> {
        let t = self.toeplitz.to_dense();
        let tw = self.right.right_apply_transpose(&t.view());
        self.left.left_apply(&tw.view())
    }
    fn diag(&self) -> Array1<F> {
        let n = self.left.n_points().min(self.right.n_points());
        let c = self.toeplitz.column();
        Array1::from_shape_fn(n, |i| {
            let (li, lw) = (self.left.indices().row(i), self.left.weights().row(i));
            let (ri, rw) = (self.right.indices().row(i), self.right.weights().row(i));
            let mut acc = F::zero();
            for (&a, &wa) in li.iter().zip(lw.iter()) {
                for (&b, &wb) in ri.iter().zip(rw.iter()) {
                    acc += wa * wb * c[a.abs_diff(b)];
                }
            }
            acc
        })
    }
}

/// Kronecker product `A ⊗ B`
#[derive(Clone, Debug, PartialEq)]
pub struct KroneckerOperator<F: Float> {
    left: Array2<F>,
    right: Array2<F>,
}

impl<F: Float> KroneckerOperator<F> {
    /// `left ⊗ right`
    pub fn new(left: Array2<F>, right: Array2<F>) -> Self {
        KroneckerOperator { left, right }
    }
}

impl<F: Float> LinearOperator<F> for KroneckerOperator<F> {
    fn shape(&self) -> (usize, usize) {
        let (ra, ca) = self.left.dim();
        let (rb, cb) = self.right.dim();
        (ra * rb, ca * cb)
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        // (A ⊗ B) vec(V) = vec(A V B^T) with row-major vec
        let (ca, cb) = (self.left.ncols(), self.right.ncols());
        let vmat = Array2::from_shape_fn((ca, cb), |(i, j)| v[i * cb + j]);
        let res = self.left.dot(&vmat).dot(&self.right.t());
        res.iter().cloned().collect()
    }
    fn to_dense(&self) -> Array2<F> {
        ndarray::linalg::kron(&self.left, &self.right)
    }
    fn diag(&self) -> Array1<F> {
        if !self.left.is_square() || !self.right.is_square() {
            return self.to_dense().diag().to_owned();
        }
        let (da, db) = (self.left.diag(), self.right.diag());
        da.iter()
            .flat_map(|&a| db.iter().map(move |&b| a * b))
            .collect()
    }
}

/// Element-wise product of two root operators `(L L^T) ∘ (R R^T)`
/// with `L` (n, k1) and `R` (n, k2), products cost O(n k1 k2)
#[derive(Clone, Debug, PartialEq)]
pub struct HadamardRootOperator<F: Float> {
    left: Array2<F>,
    right: Array2<F>,
}

impl<F: Float> HadamardRootOperator<F> {
    /// *Panics* if roots do not have the same number of rows
    pub fn new(left: Array2<F>, right: Array2<F>) -> Self {
        assert_eq!(left.nrows(), right.nrows());
        HadamardRootOperator { left, right }
    }

    /// Exact (n, k1 * k2) root made of row-wise Kronecker products
    pub fn exact_root(&self) -> Array2<F> {
        let (n, k1) = self.left.dim();
        let k2 = self.right.ncols();
        Array2::from_shape_fn((n, k1 * k2), |(i, j)| {
            self.left[[i, j / k2]] * self.right[[i, j % k2]]
        })
    }
}

impl<F: Float> LinearOperator<F> for HadamardRootOperator<F> {
    fn shape(&self) -> (usize, usize) {
        (self.left.nrows(), self.left.nrows())
    }
    fn matvec(&self, v: &ArrayView1<F>) -> Array1<F> {
        // rowsum(L ∘ (R (R^T (L ∘ v))))
        let lv = &self.left * &v.view().insert_axis(Axis(1));
        let u = self.right.dot(&self.right.t().dot(&lv));
        (&self.left * &u).sum_axis(Axis(1))
    }
    fn diag(&self) -> Array1<F> {
        let dl = (&self.left * &self.left).sum_axis(Axis(1));
        let dr = (&self.right * &self.right).sum_axis(Axis(1));
        dl * dr
    }
}
