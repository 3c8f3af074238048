//! Scores that can be read forwards and differentiated backwards.
//!
//! [`Adjoints`] is the only channel through which external scoring code
//! influences the engine: the agenda orders by [`Adjoints::forwards`] and
//! training code pushes gradients with [`Adjoints::backwards`]. The core never
//! looks at how a score was computed.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A scalar score with a gradient hook.
pub trait Adjoints: fmt::Debug {
    /// The score. Implementations should make repeated calls cheap.
    fn forwards(&self) -> f64;

    /// Accumulate `d_err_d_forwards` into whatever parameters produced the score.
    fn backwards(&mut self, d_err_d_forwards: f64);
}

impl Adjoints for Box<dyn Adjoints> {
    fn forwards(&self) -> f64 {
        (**self).forwards()
    }

    fn backwards(&mut self, d_err_d_forwards: f64) {
        (**self).backwards(d_err_d_forwards)
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// A fixed score with no parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);

impl Constant {
    pub const ZERO: Constant = Constant(0.0);

    pub fn boxed(value: f64) -> Box<dyn Adjoints> {
        Box::new(Constant(value))
    }
}

impl Adjoints for Constant {
    fn forwards(&self) -> f64 {
        self.0
    }

    fn backwards(&mut self, _d_err_d_forwards: f64) {}
}

/// A learnable scalar whose gradient is accumulated into a shared cell.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: f64,
    grad: Rc<Cell<f64>>,
}

impl Param {
    pub fn new(value: f64, grad: Rc<Cell<f64>>) -> Self {
        Self { value, grad }
    }

    /// Gradient accumulated so far.
    pub fn grad(&self) -> f64 {
        self.grad.get()
    }
}

impl Adjoints for Param {
    fn forwards(&self) -> f64 {
        self.value
    }

    fn backwards(&mut self, d_err_d_forwards: f64) {
        self.grad.set(self.grad.get() + d_err_d_forwards);
    }
}

/// `factor * inner`.
#[derive(Debug)]
pub struct Scale {
    pub factor: f64,
    pub inner: Box<dyn Adjoints>,
}

impl Adjoints for Scale {
    fn forwards(&self) -> f64 {
        self.factor * self.inner.forwards()
    }

    fn backwards(&mut self, d_err_d_forwards: f64) {
        self.inner.backwards(self.factor * d_err_d_forwards);
    }
}

/// Sum of several scores; the gradient reaches every term unchanged.
#[derive(Debug, Default)]
pub struct Sum(pub Vec<Box<dyn Adjoints>>);

impl Sum {
    pub fn of(a: Box<dyn Adjoints>, b: Box<dyn Adjoints>) -> Self {
        Sum(vec![a, b])
    }
}

impl Adjoints for Sum {
    fn forwards(&self) -> f64 {
        self.0.iter().map(|a| a.forwards()).sum()
    }

    fn backwards(&mut self, d_err_d_forwards: f64) {
        for a in &mut self.0 {
            a.backwards(d_err_d_forwards);
        }
    }
}

/// Memoizes `forwards` of an expensive inner score.
#[derive(Debug)]
pub struct Cached<A: Adjoints> {
    inner: A,
    cache: Cell<Option<f64>>,
}

impl<A: Adjoints> Cached<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            cache: Cell::new(None),
        }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: Adjoints> Adjoints for Cached<A> {
    fn forwards(&self) -> f64 {
        if let Some(v) = self.cache.get() {
            return v;
        }
        let v = self.inner.forwards();
        self.cache.set(Some(v));
        v
    }

    fn backwards(&mut self, d_err_d_forwards: f64) {
        self.inner.backwards(d_err_d_forwards);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counting {
        calls: Rc<Cell<usize>>,
    }

    impl Adjoints for Counting {
        fn forwards(&self) -> f64 {
            self.calls.set(self.calls.get() + 1);
            2.5
        }

        fn backwards(&mut self, _d: f64) {}
    }

    #[test]
    fn sum_and_scale_compose() {
        let grad = Rc::new(Cell::new(0.0));
        let mut score = Sum::of(
            Box::new(Scale {
                factor: 2.0,
                inner: Box::new(Param::new(1.5, Rc::clone(&grad))),
            }),
            Constant::boxed(-1.0),
        );
        assert!((score.forwards() - 2.0).abs() < 1e-12);

        score.backwards(0.5);
        assert!((grad.get() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cached_computes_once() {
        let calls = Rc::new(Cell::new(0));
        let cached = Cached::new(Counting {
            calls: Rc::clone(&calls),
        });
        assert_eq!(cached.forwards(), 2.5);
        assert_eq!(cached.forwards(), 2.5);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn constant_ignores_gradient() {
        let mut c = Constant(3.0);
        c.backwards(10.0);
        assert_eq!(c.forwards(), 3.0);
        assert_eq!(Constant::ZERO.forwards(), 0.0);
    }
}
