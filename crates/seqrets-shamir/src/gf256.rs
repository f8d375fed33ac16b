//! Galois Field GF(256) arithmetic for Shamir's Secret Sharing
//!
//! Uses the AES reduction polynomial x^8 + x^4 + x^3 + x + 1 (0x11B) with
//! generator 0x03. The log/exp tables are computed at compile time.

const REDUCTION_POLY: u16 = 0x11B;
const GENERATOR: u16 = 0x03;

/// (log, exp). `exp` is doubled in length so `log[a] + log[b]` never needs a modulo.
const TABLES: ([u8; 256], [u8; 510]) = build_tables();

static LOG: [u8; 256] = TABLES.0;
static EXP: [u8; 510] = TABLES.1;

const fn xtime_mul(a: u16, b: u16) -> u16 {
    // Carry-less multiply by repeated doubling, reducing as we go
    let mut a = a;
    let mut b = b;
    let mut product = 0u16;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        a <<= 1;
        if a & 0x100 != 0 {
            a ^= REDUCTION_POLY;
        }
        b >>= 1;
    }
    product
}

const fn build_tables() -> ([u8; 256], [u8; 510]) {
    let mut log = [0u8; 256];
    let mut exp = [0u8; 510];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        exp[i + 255] = x as u8;
        log[x as usize] = i as u8;
        x = xtime_mul(x, GENERATOR);
        i += 1;
    }
    (log, exp)
}

/// Add two elements in GF(256) (XOR)
#[inline]
pub fn gf_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Multiply two elements in GF(256)
#[inline]
pub fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
}

/// Divide two elements in GF(256). `b` must be nonzero.
#[inline]
pub fn gf_div(a: u8, b: u8) -> u8 {
    assert!(b != 0, "Division by zero in GF(256)");
    if a == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + 255 - LOG[b as usize] as usize]
}

/// Evaluate a polynomial at `x` (Horner).
/// `coefficients[0]` is the constant term.
pub fn poly_eval(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &coef| gf_add(gf_mul(acc, x), coef))
}

/// Lagrange basis values `L_i(0)` for the given evaluation points.
///
/// Points must be distinct and nonzero; callers check this first.
pub fn lagrange_basis_at_zero(xs: &[u8]) -> Vec<u8> {
    xs.iter()
        .enumerate()
        .map(|(i, &xi)| {
            let mut numerator = 1u8;
            let mut denominator = 1u8;
            for (j, &xj) in xs.iter().enumerate() {
                if i != j {
                    // (0 - xj) == xj in characteristic 2
                    numerator = gf_mul(numerator, xj);
                    denominator = gf_mul(denominator, gf_add(xi, xj));
                }
            }
            gf_div(numerator, denominator)
        })
        .collect()
}

/// Interpolate the value at x = 0 from `(x, y)` points.
pub fn lagrange_interpolate(points: &[(u8, u8)]) -> u8 {
    let xs: Vec<u8> = points.iter().map(|&(x, _)| x).collect();
    let basis = lagrange_basis_at_zero(&xs);
    points
        .iter()
        .zip(basis)
        .fold(0u8, |acc, (&(_, y), l)| gf_add(acc, gf_mul(y, l)))
}
