//! Gadget tables, decomposed polynomials and dot products.
//!
//! A gadget ciphertext is a 2-D table indexed `[decomp_rns][decomp_pw2]`,
//! each cell holding one pair of polynomials over the extended Q x P basis.
//! It encrypts a key-dependent quantity against every digit of the gadget
//! basis, so that a digit-decomposed polynomial can be key-switched by a
//! dot product against the table columns.

use serde::{Deserialize, Serialize};

use crate::math::{RnsContext, RnsPoly};

/// One polynomial over the extended basis: a Q part and, when the
/// parameter set carries an auxiliary chain, a P part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolyQP {
    /// Component over the ciphertext chain Q.
    pub q: RnsPoly,
    /// Component over the auxiliary chain P.
    pub p: Option<RnsPoly>,
}

impl PolyQP {
    /// Allocate a zero pair at the given levels.
    pub fn zero(n: usize, level_q: usize, level_p: Option<usize>) -> Self {
        Self {
            q: RnsPoly::zero(n, level_q),
            p: level_p.map(|lp| RnsPoly::zero(n, lp)),
        }
    }
}

/// One key column: a gadget-indexed vector of Q x P polynomials.
///
/// Stored in the transform domain and Montgomery form, ready for
/// multiply-accumulate against decomposed digits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GadgetVector {
    /// One entry per CRT digit.
    pub polys: Vec<PolyQP>,
}

impl GadgetVector {
    /// Number of digits.
    pub fn len(&self) -> usize {
        self.polys.len()
    }

    /// True when the column has no digits.
    pub fn is_empty(&self) -> bool {
        self.polys.is_empty()
    }
}

/// Gadget ciphertext: `[decomp_rns][decomp_pw2]` cells of paired Q x P
/// polynomials, immutable once built. The level bounds are part of its
/// identity; a key-switch never exceeds them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GadgetCiphertext {
    cells: Vec<Vec<[PolyQP; 2]>>,
    level_q: usize,
    level_p: Option<usize>,
}

impl GadgetCiphertext {
    /// Build a table from its cells.
    ///
    /// # Panics
    ///
    /// Panics if the rows are ragged.
    pub fn new(cells: Vec<Vec<[PolyQP; 2]>>, level_q: usize, level_p: Option<usize>) -> Self {
        assert!(!cells.is_empty(), "gadget table needs at least one digit");
        let width = cells[0].len();
        assert!(
            cells.iter().all(|row| row.len() == width),
            "gadget table rows must have equal width"
        );
        Self {
            cells,
            level_q,
            level_p,
        }
    }

    /// Maximum Q level this table supports.
    pub fn level_q(&self) -> usize {
        self.level_q
    }

    /// Level of the auxiliary chain, `None` without extension.
    pub fn level_p(&self) -> Option<usize> {
        self.level_p
    }

    /// Number of CRT digits.
    pub fn decomp_rns(&self) -> usize {
        self.cells.len()
    }

    /// Number of power-of-two sub-digits per CRT digit.
    pub fn decomp_pw2(&self) -> usize {
        self.cells[0].len()
    }

    /// Borrow cell `(i, j)`.
    pub fn cell(&self, i: usize, j: usize) -> &[PolyQP; 2] {
        &self.cells[i][j]
    }

    /// View column `col` of a pure-RNS table as a gadget vector slice.
    ///
    /// # Panics
    ///
    /// Panics if the table carries power-of-two sub-digits; columns are
    /// only meaningful over plain CRT digits.
    pub fn column(&self, col: usize) -> Vec<&PolyQP> {
        assert_eq!(
            self.decomp_pw2(),
            1,
            "gadget columns require pure RNS digits"
        );
        self.cells.iter().map(|row| &row[0][col]).collect()
    }
}

/// Digit decomposition of one polynomial: `decomp_rns` digits lifted to
/// both the Q and the P chain, in the transform domain.
#[derive(Clone, Debug)]
pub struct DecomposedPoly {
    /// Digits over Q.
    pub q: Vec<RnsPoly>,
    /// Digits over P; empty without extension.
    pub p: Vec<RnsPoly>,
}

impl DecomposedPoly {
    /// Number of digits.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// True when there are no digits.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}

/// Dot product of a decomposed polynomial against one key column over the
/// extended basis, reduced at every step.
///
/// The column entries must be in transform-domain Montgomery form; the
/// digits in plain transform domain.
///
/// # Panics
///
/// Panics if the digit count does not match the column length.
pub fn dot_qp(
    level_q: usize,
    dec: &DecomposedPoly,
    column: &[&PolyQP],
    ring_q: &RnsContext,
    ring_p: Option<&RnsContext>,
) -> PolyQP {
    assert!(
        column.len() >= dec.len(),
        "key column too short for the digit count"
    );
    let n = ring_q.dimension();
    let level_p = ring_p.map(|r| r.max_level());

    let mut res = PolyQP::zero(n, level_q, level_p);
    res.q.set_ntt_flag(true);
    if let Some(p) = res.p.as_mut() {
        p.set_ntt_flag(true);
    }

    for (i, cell) in column.iter().take(dec.len()).enumerate() {
        ring_q.mul_montgomery_and_add_lvl(level_q, &cell.q, &dec.q[i], &mut res.q);
        if let (Some(ring_p), Some(acc_p)) = (ring_p, res.p.as_mut()) {
            let key_p = cell.p.as_ref().expect("column lacks a P component");
            ring_p.mul_montgomery_and_add_lvl(ring_p.max_level(), key_p, &dec.p[i], acc_p);
        }
    }
    res
}
