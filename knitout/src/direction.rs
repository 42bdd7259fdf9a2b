use core::fmt;

// DIRECTION
// ================================================================================================

/// Carriage travel direction for a knitting pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Direction {
    Leftward,
    Rightward,
}

impl Direction {
    /// Returns the opposite direction.
    pub const fn reversed(&self) -> Direction {
        match self {
            Direction::Leftward => Direction::Rightward,
            Direction::Rightward => Direction::Leftward,
        }
    }

    /// Returns the per-needle offset step of this direction (−1 or +1).
    pub const fn step(&self) -> i32 {
        match self {
            Direction::Leftward => -1,
            Direction::Rightward => 1,
        }
    }

    /// Returns the side a carrier parks on after moving in this direction.
    pub const fn parking_side(&self) -> Side {
        match self {
            Direction::Leftward => Side::Left,
            Direction::Rightward => Side::Right,
        }
    }

    /// Returns the direction that travels from `from` toward `to`, rightward on a tie.
    pub fn toward(from: i32, to: i32) -> Direction {
        if to < from { Direction::Leftward } else { Direction::Rightward }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Leftward => f.write_str("-"),
            Direction::Rightward => f.write_str("+"),
        }
    }
}

// SIDE
// ================================================================================================

/// Which side of a needle a carrier sits on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Returns the opposite side.
    pub const fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Returns the direction that moves a carrier onto this side of a needle.
    pub const fn approach(&self) -> Direction {
        match self {
            Side::Left => Direction::Leftward,
            Side::Right => Direction::Rightward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_roundtrips() {
        assert_eq!(Direction::Leftward.reversed(), Direction::Rightward);
        assert_eq!(Direction::Rightward.step(), 1);
        assert_eq!(format!("{}", Direction::Leftward), "-");
        assert_eq!(Direction::toward(3, 0), Direction::Leftward);
        assert_eq!(Direction::toward(3, 3), Direction::Rightward);
    }

    #[test]
    fn side_relations() {
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Side::Right.approach(), Direction::Rightward);
        assert_eq!(Direction::Leftward.parking_side(), Side::Left);
    }
}
