//! Passes: transformations of function bodies and modules.

pub mod resolve_aliases;
pub mod sccp;

/// A budget of individual rewrites. Running a pass with limited fuel
/// applies only the first few changes it wants to make, which lets a
/// miscompile be bisected down to a single rewrite.
#[derive(Clone, Debug)]
pub struct Fuel {
    pub remaining: u64,
    pub consumed: u64,
}

impl Fuel {
    pub fn consume(&mut self) -> bool {
        self.consumed += 1;
        if self.remaining == u64::MAX {
            return true;
        }
        if self.remaining == 0 {
            false
        } else {
            self.remaining -= 1;
            true
        }
    }

    pub fn infinite() -> Fuel {
        Fuel {
            consumed: 0,
            remaining: u64::MAX,
        }
    }

    pub fn limited(remaining: u64) -> Fuel {
        Fuel {
            consumed: 0,
            remaining,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fuel_runs_out() {
        let mut fuel = Fuel::limited(2);
        assert!(fuel.consume());
        assert!(fuel.consume());
        assert!(!fuel.consume());
        assert_eq!(fuel.consumed, 3);

        let mut fuel = Fuel::infinite();
        for _ in 0..10 {
            assert!(fuel.consume());
        }
        assert_eq!(fuel.remaining, u64::MAX);
    }
}
