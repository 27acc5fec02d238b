/// An axis of the layout plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    X,
    Y,
}

impl Dim {
    pub const BOTH: [Dim; 2] = [Dim::X, Dim::Y];

    pub fn other(self) -> Dim {
        match self {
            Dim::X => Dim::Y,
            Dim::Y => Dim::X,
        }
    }

    /// Maps the flat-API convention (`0` = horizontal, `1` = vertical).
    pub fn from_index(index: i32) -> Option<Dim> {
        match index {
            0 => Some(Dim::X),
            1 => Some(Dim::Y),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Dim::X => 0,
            Dim::Y => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn get(&self, dim: Dim) -> f64 {
        match dim {
            Dim::X => self.x,
            Dim::Y => self.y,
        }
    }
}

/// Center-anchored axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_bounds(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            x: (min_x + max_x) / 2.0,
            y: (min_y + max_y) / 2.0,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    pub fn center(&self, dim: Dim) -> f64 {
        match dim {
            Dim::X => self.x,
            Dim::Y => self.y,
        }
    }

    pub fn size(&self, dim: Dim) -> f64 {
        match dim {
            Dim::X => self.width,
            Dim::Y => self.height,
        }
    }

    pub fn min(&self, dim: Dim) -> f64 {
        self.center(dim) - self.size(dim) / 2.0
    }

    pub fn max(&self, dim: Dim) -> f64 {
        self.center(dim) + self.size(dim) / 2.0
    }

    pub fn set_center(&mut self, dim: Dim, value: f64) {
        match dim {
            Dim::X => self.x = value,
            Dim::Y => self.y = value,
        }
    }

    /// Grows every side by `amount` (negative amounts shrink, never below zero size).
    pub fn inflate(&self, amount: f64) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width: (self.width + 2.0 * amount).max(0.0),
            height: (self.height + 2.0 * amount).max(0.0),
        }
    }

    pub fn union(&self, other: &Rectangle) -> Self {
        Self::from_bounds(
            self.min(Dim::X).min(other.min(Dim::X)),
            self.max(Dim::X).max(other.max(Dim::X)),
            self.min(Dim::Y).min(other.min(Dim::Y)),
            self.max(Dim::Y).max(other.max(Dim::Y)),
        )
    }

    /// Amount of overlap along `dim`, measured from the side facing `other`'s center. Zero when
    /// the projections onto that axis are disjoint.
    pub fn overlap(&self, other: &Rectangle, dim: Dim) -> f64 {
        let uc = self.center(dim);
        let vc = other.center(dim);
        if uc <= vc && other.min(dim) < self.max(dim) {
            return self.max(dim) - other.min(dim);
        }
        if vc <= uc && self.min(dim) < other.max(dim) {
            return other.max(dim) - self.min(dim);
        }
        0.0
    }

    /// True when the interiors intersect by more than `eps` on both axes.
    pub fn overlaps(&self, other: &Rectangle, eps: f64) -> bool {
        Dim::BOTH.iter().all(|&d| {
            let lo = self.min(d).max(other.min(d));
            let hi = self.max(d).min(other.max(d));
            hi - lo > eps
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Dim, Rectangle};

    #[test]
    fn overlap_is_measured_towards_the_other_center() {
        let a = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        let b = Rectangle::new(8.0, 1.0, 10.0, 4.0);
        assert_eq!(a.overlap(&b, Dim::X), 2.0);
        assert_eq!(b.overlap(&a, Dim::X), 2.0);
        // b spans [-1, 3] inside a's [-5, 5]; overlap is measured from a's upper side.
        assert_eq!(a.overlap(&b, Dim::Y), 6.0);
    }

    #[test]
    fn touching_rectangles_do_not_overlap() {
        let a = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        let b = Rectangle::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&b, 0.0));
        assert_eq!(a.overlap(&b, Dim::X), 0.0);
    }

    #[test]
    fn union_and_inflate() {
        let a = Rectangle::new(0.0, 0.0, 2.0, 2.0);
        let b = Rectangle::new(4.0, 4.0, 2.0, 2.0);
        let u = a.union(&b).inflate(1.0);
        assert_eq!(u.min(Dim::X), -2.0);
        assert_eq!(u.max(Dim::Y), 6.0);
        assert_eq!((u.min(Dim::Y), u.max(Dim::X)), (-2.0, 6.0));
    }
}
