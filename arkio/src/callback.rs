use std::fmt;

/// A single-invocation continuation.
///
/// `call` takes `self` by value, so a callback can run at most once. The
/// context owns the callback of a pending operation until it delivers the
/// terminal result.
pub struct Callback<T> {
  f: Box<dyn FnOnce(T)>,
}

impl<T> Callback<T> {
  pub fn new<F>(f: F) -> Self
  where
    F: FnOnce(T) + 'static,
  {
    Self { f: Box::new(f) }
  }

  pub fn call(self, value: T) {
    (self.f)(value)
  }

  /// Adapts the callback to a different argument type.
  pub fn map<U, F>(self, f: F) -> Callback<U>
  where
    T: 'static,
    F: FnOnce(U) -> T + 'static,
  {
    Callback::new(move |value| self.call(f(value)))
  }
}

impl<T> fmt::Debug for Callback<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Callback")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{cell::Cell, rc::Rc};

  #[test]
  fn invokes_with_value() {
    let seen = Rc::new(Cell::new(0));
    let cb = Callback::new({
      let seen = seen.clone();
      move |v: i32| seen.set(v)
    });
    cb.call(7);
    assert_eq!(seen.get(), 7);
  }

  #[test]
  fn map_converts_argument() {
    let seen = Rc::new(Cell::new(0usize));
    let cb = Callback::new({
      let seen = seen.clone();
      move |v: usize| seen.set(v)
    })
    .map(|s: &'static str| s.len());
    cb.call("four");
    assert_eq!(seen.get(), 4);
  }

  #[test]
  fn dropping_does_not_invoke() {
    let seen = Rc::new(Cell::new(false));
    let cb = Callback::new({
      let seen = seen.clone();
      move |()| seen.set(true)
    });
    drop(cb);
    assert!(!seen.get());
  }
}
