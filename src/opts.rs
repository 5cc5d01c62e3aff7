// Runtime configuration for block discovery, with the recognised defaults.

use std::io;

#[derive(Debug, Clone)]
pub struct FinderOpt {
    /// k-mer length of the junction graph; must be odd.
    pub k: usize,
    /// Bubble and gap tolerance along an extension, in base pairs.
    pub max_branch_size: i64,
    /// Allowed excess of a flank distance beyond the good part of an instance.
    pub max_flanking_size: i64,
    /// Smallest length of a "good" instance; drives the commit criterion.
    pub min_block_size: i64,
    /// Voting horizon of the extender, in vertices.
    pub looking_depth: i64,
    /// If positive, the randomised-walk extender runs with this many samples.
    pub sample_size: i64,
    pub threads: usize,
    /// Extend from every vertex instead of bubble sources only.
    pub all_seeds: bool,
}

impl Default for FinderOpt {
    fn default() -> Self {
        FinderOpt {
            k: 25,
            max_branch_size: 125,
            max_flanking_size: 50,
            min_block_size: 300,
            looking_depth: 8,
            sample_size: 0,
            threads: 1,
            all_seeds: false,
        }
    }
}

impl FinderOpt {
    /// Smallest instance length that still counts towards a block once both
    /// flanks are taken off.
    pub fn min_chain_size(&self) -> i64 {
        self.min_block_size - 2 * self.max_flanking_size
    }

    pub fn validate(&self) -> io::Result<()> {
        if self.k == 0 || self.k % 2 == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("value of k must be a positive odd integer, got {}", self.k),
            ));
        }
        if self.threads == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "at least one worker thread is required",
            ));
        }
        if self.min_block_size <= 0 || self.max_branch_size <= 0 || self.max_flanking_size < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "block, branch and flank sizes must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opt = FinderOpt::default();
        assert_eq!(opt.k, 25);
        assert_eq!(opt.max_branch_size, 125);
        assert_eq!(opt.max_flanking_size, 50);
        assert_eq!(opt.min_block_size, 300);
        assert_eq!(opt.looking_depth, 8);
        assert_eq!(opt.sample_size, 0);
        assert_eq!(opt.threads, 1);
        assert_eq!(opt.min_chain_size(), 200);
        assert!(opt.validate().is_ok());
    }

    #[test]
    fn test_even_k_rejected() {
        let opt = FinderOpt { k: 24, ..Default::default() };
        assert!(opt.validate().is_err());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let opt = FinderOpt { threads: 0, ..Default::default() };
        assert!(opt.validate().is_err());
    }
}
