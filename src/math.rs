// src/math.rs
// Symbolic side of the pendulum model: builds the Lagrangian L = T - V, applies Euler-Lagrange
// d/dt(dL/dθ') - dL/dθ = 0, solves the result for θ'' and compiles the closed form into a numeric evaluator.
// Expressions are polynomials over the atoms {m, g, l, sin θ, cos θ, θ, θ', θ'', ...} with integer (possibly
// negative) exponents. cos²θ is always rewritten as 1 - sin²θ, which makes the representation canonical
// modulo sin² + cos² = 1, so cancellations such as the mass dropping out happen structurally.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use tracing::debug;

use crate::error::DerivationError;

// Coefficients below this are treated as exact cancellations.
const COEFFICIENT_EPSILON: f64 = 1e-12;

/// Atoms an expression is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Mass,
    Gravity,
    Length,
    SinAngle,
    CosAngle,
    /// k-th time derivative of the angle; `Angle(0)` is θ itself.
    Angle(u8),
}

impl Symbol {
    pub const ANGLE: Symbol = Symbol::Angle(0);
    pub const ANGULAR_VELOCITY: Symbol = Symbol::Angle(1);
    pub const ANGULAR_ACCELERATION: Symbol = Symbol::Angle(2);

    /// Total derivative with respect to time. Parameters are constants, θ is a function of time.
    fn time_derivative(self) -> Polynomial {
        match self {
            Symbol::Mass | Symbol::Gravity | Symbol::Length => Polynomial::zero(),
            Symbol::SinAngle => Polynomial::symbol(Symbol::CosAngle) * Polynomial::symbol(Symbol::ANGULAR_VELOCITY),
            Symbol::CosAngle => -(Polynomial::symbol(Symbol::SinAngle) * Polynomial::symbol(Symbol::ANGULAR_VELOCITY)),
            Symbol::Angle(order) => Polynomial::symbol(Symbol::Angle(order + 1)),
        }
    }

    /// Partial derivative with respect to `var`, where sin θ and cos θ depend on `Angle(0)`.
    fn partial(self, var: Symbol) -> Polynomial {
        match (self, var) {
            (Symbol::SinAngle, Symbol::Angle(0)) => Polynomial::symbol(Symbol::CosAngle),
            (Symbol::CosAngle, Symbol::Angle(0)) => -Polynomial::symbol(Symbol::SinAngle),
            (atom, var) if atom == var => Polynomial::constant(1.0),
            _ => Polynomial::zero(),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Mass => write!(f, "m"),
            Symbol::Gravity => write!(f, "g"),
            Symbol::Length => write!(f, "l"),
            Symbol::SinAngle => write!(f, "sin(θ)"),
            Symbol::CosAngle => write!(f, "cos(θ)"),
            Symbol::Angle(order) => write!(f, "θ{}", "'".repeat(*order as usize)),
        }
    }
}

/// Product of atoms raised to nonzero integer powers.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Monomial(BTreeMap<Symbol, i32>);

impl Monomial {
    pub fn one() -> Self {
        Self::default()
    }

    pub fn of(symbol: Symbol, power: i32) -> Self {
        Self::one().times(symbol, power)
    }

    fn times(mut self, symbol: Symbol, power: i32) -> Self {
        let exponent = self.0.entry(symbol).or_insert(0);
        *exponent += power;
        if *exponent == 0 {
            self.0.remove(&symbol);
        }
        self
    }

    fn product(&self, other: &Monomial) -> Monomial {
        other
            .0
            .iter()
            .fold(self.clone(), |acc, (&symbol, &power)| acc.times(symbol, power))
    }

    fn inverse(&self) -> Monomial {
        Monomial(self.0.iter().map(|(&s, &p)| (s, -p)).collect())
    }

    pub fn power_of(&self, symbol: Symbol) -> i32 {
        self.0.get(&symbol).copied().unwrap_or(0)
    }

    fn without(&self, symbol: Symbol) -> Monomial {
        let mut rest = self.clone();
        rest.0.remove(&symbol);
        rest
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.0.keys().copied()
    }
}

/// Sum of coefficient * monomial terms, kept in reduced form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, f64>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self::term(Monomial::one(), value)
    }

    pub fn symbol(symbol: Symbol) -> Self {
        Self::term(Monomial::of(symbol, 1), 1.0)
    }

    pub fn term(monomial: Monomial, coefficient: f64) -> Self {
        Self::reduced([(monomial, coefficient)])
    }

    /// Accumulates raw terms and rewrites every cos^k, k >= 2, through cos² = 1 - sin².
    fn reduced(raw: impl IntoIterator<Item = (Monomial, f64)>) -> Self {
        let mut pending: Vec<(Monomial, f64)> = raw.into_iter().collect();
        let mut terms: BTreeMap<Monomial, f64> = BTreeMap::new();
        while let Some((monomial, coefficient)) = pending.pop() {
            if monomial.power_of(Symbol::CosAngle) >= 2 {
                let lowered = monomial.times(Symbol::CosAngle, -2);
                pending.push((lowered.clone(), coefficient));
                pending.push((lowered.times(Symbol::SinAngle, 2), -coefficient));
                continue;
            }
            *terms.entry(monomial).or_insert(0.0) += coefficient;
        }
        terms.retain(|_, c| c.abs() > COEFFICIENT_EPSILON);
        Self { terms }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, f64)> {
        self.terms.iter().map(|(m, &c)| (m, c))
    }

    pub fn powi(&self, exponent: u32) -> Self {
        (0..exponent).fold(Self::constant(1.0), |acc, _| acc * self.clone())
    }

    /// Generic product-rule differentiation, `rule` gives the derivative of each atom.
    fn differentiate(&self, rule: impl Fn(Symbol) -> Polynomial) -> Self {
        let mut out = Self::zero();
        for (monomial, &coefficient) in &self.terms {
            for (&atom, &power) in &monomial.0 {
                let inner = rule(atom);
                if inner.is_zero() {
                    continue;
                }
                let rest = monomial.clone().times(atom, -1);
                out = out + Self::term(rest, coefficient * power as f64) * inner;
            }
        }
        out
    }

    pub fn time_derivative(&self) -> Self {
        self.differentiate(Symbol::time_derivative)
    }

    pub fn partial(&self, var: Symbol) -> Self {
        self.differentiate(|atom| atom.partial(var))
    }

    /// (lowest, highest) exponent of `symbol` across all terms, (0, 0) when absent.
    pub fn exponent_range(&self, symbol: Symbol) -> (i32, i32) {
        self.terms.keys().map(|m| m.power_of(symbol)).fold((0, 0), |(lo, hi), p| (lo.min(p), hi.max(p)))
    }

    /// Collects the terms carrying exactly `symbol^power`, with that factor removed.
    pub fn coefficient_of(&self, symbol: Symbol, power: i32) -> Self {
        Self::reduced(
            self.terms
                .iter()
                .filter(|(m, _)| m.power_of(symbol) == power)
                .map(|(m, &c)| (m.without(symbol), c)),
        )
    }

    /// Single-term view, used to divide out monomial denominators exactly.
    pub fn as_monomial(&self) -> Option<(&Monomial, f64)> {
        match self.terms.len() {
            1 => self.terms.iter().next().map(|(m, &c)| (m, c)),
            _ => None,
        }
    }

    fn divide_by(&self, monomial: &Monomial, coefficient: f64) -> Self {
        let inverse = monomial.inverse();
        Self::reduced(self.terms.iter().map(|(m, &c)| (m.product(&inverse), c / coefficient)))
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.terms.keys().flat_map(|m| m.symbols()).collect()
    }
}

impl Add for Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: Polynomial) -> Polynomial {
        Polynomial::reduced(self.terms.into_iter().chain(rhs.terms))
    }
}

impl Neg for Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        Polynomial::reduced(self.terms.into_iter().map(|(m, c)| (m, -c)))
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: Polynomial) -> Polynomial {
        self + (-rhs)
    }
}

impl Mul for Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: Polynomial) -> Polynomial {
        let mut raw = Vec::with_capacity(self.terms.len() * rhs.terms.len());
        for (a, &ca) in &self.terms {
            for (b, &cb) in &rhs.terms {
                raw.push((a.product(b), ca * cb));
            }
        }
        Polynomial::reduced(raw)
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        for (i, (monomial, coefficient)) in self.terms().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{coefficient}")?;
            for (symbol, &power) in &monomial.0 {
                match power {
                    1 => write!(f, "·{symbol}")?,
                    p => write!(f, "·{symbol}^{p}")?,
                }
            }
        }
        Ok(())
    }
}

/// Anything that can state its own Lagrangian in terms of the pendulum atoms.
pub trait Lagrangian {
    fn lagrangian(&self) -> Polynomial;
}

/// Point mass on a rigid massless rod, pivot at the origin, x = l·sin θ, y = -l·cos θ.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePendulum;

impl Lagrangian for SimplePendulum {
    fn lagrangian(&self) -> Polynomial {
        let mass = Polynomial::symbol(Symbol::Mass);
        let gravity = Polynomial::symbol(Symbol::Gravity);
        let length = Polynomial::symbol(Symbol::Length);

        let x = length.clone() * Polynomial::symbol(Symbol::SinAngle); // x = l·sin θ.
        let y = -(length * Polynomial::symbol(Symbol::CosAngle)); // y = -l·cos θ, pivot at the origin.

        let speed_squared = x.time_derivative().powi(2) + y.time_derivative().powi(2); // x'² + y'², collapses to l²θ'².
        let kinetic = Polynomial::constant(0.5) * mass.clone() * speed_squared; // T = ½·m·v².
        let potential = mass * gravity * y; // V = m·g·y.
        kinetic - potential
    }
}

/// d/dt(∂L/∂θ') - ∂L/∂θ, the expression that must vanish along a trajectory.
pub fn euler_lagrange(lagrangian: &Polynomial) -> Polynomial {
    let momentum = lagrangian.partial(Symbol::ANGULAR_VELOCITY); // ∂L/∂θ'.
    momentum.time_derivative() - lagrangian.partial(Symbol::ANGLE) // Chain rule turns θ' into θ''.
}

/// Solves `equation = 0` for `target`, which must appear linearly.
pub fn solve_linear(equation: &Polynomial, target: Symbol) -> Result<Polynomial, DerivationError> {
    match equation.exponent_range(target) {
        (0, 0) => return Err(DerivationError::NoSolution),
        (0, 1) => {}
        (lo, hi) => return Err(DerivationError::MultipleSolutions { degree: hi.max(-lo) }),
    }
    let slope = equation.coefficient_of(target, 1); // equation = slope·target + offset.
    let offset = equation.coefficient_of(target, 0);
    match slope.as_monomial() {
        Some((monomial, coefficient)) => Ok((-offset).divide_by(monomial, coefficient)),
        None if slope.is_zero() => Err(DerivationError::NoSolution),
        // a sum in front of θ'' would leave a rational function, which this algebra does not carry
        None => Err(DerivationError::MultipleSolutions { degree: 1 }),
    }
}

/// Flattened polynomial, evaluated once per ODE right-hand-side call.
#[derive(Debug, Clone, PartialEq)]
struct CompiledPolynomial {
    terms: Vec<(f64, Vec<(Symbol, i32)>)>,
}

impl CompiledPolynomial {
    fn new(polynomial: &Polynomial) -> Self {
        let terms = polynomial
            .terms()
            .map(|(m, c)| (c, m.0.iter().map(|(&s, &p)| (s, p)).collect()))
            .collect();
        Self { terms }
    }

    fn evaluate(&self, gravity: f64, length: f64, angle: f64, angular_velocity: f64) -> f64 {
        let (sin, cos) = angle.sin_cos();
        self.terms
            .iter()
            .map(|(coefficient, factors)| {
                factors.iter().fold(*coefficient, |acc, &(symbol, power)| {
                    let value = match symbol {
                        Symbol::Gravity => gravity,
                        Symbol::Length => length,
                        Symbol::SinAngle => sin,
                        Symbol::CosAngle => cos,
                        Symbol::Angle(0) => angle,
                        Symbol::Angle(1) => angular_velocity,
                        // rejected by EquationOfMotion::derive
                        Symbol::Mass | Symbol::Angle(_) => f64::NAN,
                    };
                    acc * value.powi(power)
                })
            })
            .sum()
    }
}

/// Numeric form of the derived equation of motion: θ' and θ'' as plain functions.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationOfMotion {
    acceleration: CompiledPolynomial,
    expression: String,
}

impl EquationOfMotion {
    /// Runs the full derivation for `model`. Exactly one solution for θ'' must come out,
    /// and it may only depend on g, l, θ and θ'.
    pub fn derive<L: Lagrangian + ?Sized>(model: &L) -> Result<Self, DerivationError> {
        let lagrangian = model.lagrangian();
        let equation = euler_lagrange(&lagrangian);
        debug!(%lagrangian, %equation, "derived equation of motion");

        let acceleration = solve_linear(&equation, Symbol::ANGULAR_ACCELERATION)?;
        let allowed = [
            Symbol::Gravity,
            Symbol::Length,
            Symbol::SinAngle,
            Symbol::CosAngle,
            Symbol::ANGLE,
            Symbol::ANGULAR_VELOCITY,
        ];
        if let Some(symbol) = acceleration.symbols().into_iter().find(|s| !allowed.contains(s)) {
            return Err(DerivationError::UnboundSymbol { symbol: symbol.to_string() });
        }

        Ok(Self {
            acceleration: CompiledPolynomial::new(&acceleration),
            expression: acceleration.to_string(),
        })
    }

    /// First state equation, θ' = θ'.
    pub fn angular_velocity_of(&self, angular_velocity: f64) -> f64 {
        angular_velocity
    }

    /// θ'' for the undamped model; for the simple pendulum this is -(g/l)·sin θ.
    pub fn angular_acceleration_of(&self, gravity: f64, length: f64, angle: f64) -> f64 {
        self.acceleration.evaluate(gravity, length, angle, 0.0)
    }

    /// θ'' for models whose Lagrangian also involves θ'.
    pub fn angular_acceleration_at(&self, gravity: f64, length: f64, angle: f64, angular_velocity: f64) -> f64 {
        self.acceleration.evaluate(gravity, length, angle, angular_velocity)
    }

    /// Printable form of the solved θ''.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}
