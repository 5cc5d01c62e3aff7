#[cfg(test)]
mod tests {
    use crate::bubble::{
        bubbled_branches_backward, bubbled_branches_forward, is_block_seed, BubbledBranches,
    };
    use crate::junction::JunctionRecord;
    use crate::storage::{JunctionStorage, SeqIter};

    const K: usize = 5;
    const BRANCH: i64 = 25;

    fn rec(chr: u32, id: i32, pos: u32) -> JunctionRecord {
        JunctionRecord { chr, id, pos }
    }

    // One chromosome with a tandem repeat: unique prefix, two identical
    // copies of a 25 bp region separated by a spacer, unique suffix.
    // Vertices 1, 2, 3 are the repeat junctions.
    fn repeat_storage() -> JunctionStorage {
        let mut seq = Vec::new();
        seq.extend_from_slice(b"AAACCCAAACCCAAACCCAA"); // 0..20 prefix
        seq.extend_from_slice(b"GTACCGGTTACAGTACCAAGTACCA"); // 20..45 repeat
        seq.extend_from_slice(b"TTTAAATTTAAATTT"); // 45..60 spacer
        seq.extend_from_slice(b"GTACCGGTTACAGTACCAAGTACCA"); // 60..85 repeat
        seq.extend_from_slice(b"CCCGGGCCCGGGCCCGGGCCCGGGCCCGGGCCCGG"); // 85..120 suffix
        assert_eq!(seq.len(), 120);

        let records = vec![
            rec(0, 10, 0),
            rec(0, 11, 10),
            rec(0, 1, 20),
            rec(0, 2, 30),
            rec(0, 3, 40),
            rec(0, 12, 50),
            rec(0, 1, 60),
            rec(0, 2, 70),
            rec(0, 3, 80),
            rec(0, 13, 90),
            rec(0, 14, 100),
            rec(0, 15, 110),
        ];
        JunctionStorage::from_parts(&records, vec![("chr1".to_string(), seq)], K, 1)
            .expect("repeat storage")
    }

    fn occurrences(storage: &JunctionStorage, vid: i64) -> Vec<SeqIter<'_>> {
        let mut out = Vec::new();
        let mut it = storage.vertex_iter(vid);
        while it.valid() {
            out.push(it.sequential());
            it = it.next();
        }
        out
    }

    #[test]
    fn test_repeat_entry_is_asymmetric() {
        let storage = repeat_storage();
        let instances = occurrences(&storage, 1);
        assert_eq!(instances.len(), 2);

        let mut forward = BubbledBranches::new();
        let mut backward = BubbledBranches::new();
        bubbled_branches_forward(&instances, BRANCH, &mut forward);
        bubbled_branches_backward(&instances, BRANCH, &mut backward);

        assert_eq!(forward[0], vec![1]);
        assert!(backward[0].is_empty());
        assert!(is_block_seed(&forward, &backward));
    }

    #[test]
    fn test_repeat_interior_is_symmetric() {
        let storage = repeat_storage();
        let instances = occurrences(&storage, 2);

        let mut forward = BubbledBranches::new();
        let mut backward = BubbledBranches::new();
        bubbled_branches_forward(&instances, BRANCH, &mut forward);
        bubbled_branches_backward(&instances, BRANCH, &mut backward);

        assert_eq!(forward[0], vec![1]);
        assert_eq!(backward[0], vec![1]);
        assert!(!is_block_seed(&forward, &backward));
    }

    #[test]
    fn test_repeat_exit_seeds_on_reverse_strand() {
        let storage = repeat_storage();
        // On the reverse strand the repeat exit plays the entry role.
        let instances = occurrences(&storage, -3);
        assert_eq!(instances.len(), 2);
        assert!(instances.iter().all(|it| !it.is_positive_strand()));

        let mut forward = BubbledBranches::new();
        let mut backward = BubbledBranches::new();
        bubbled_branches_forward(&instances, BRANCH, &mut forward);
        bubbled_branches_backward(&instances, BRANCH, &mut backward);

        assert_eq!(forward[0], vec![1]);
        assert!(backward[0].is_empty());
        assert!(is_block_seed(&forward, &backward));
    }

    #[test]
    fn test_unique_vertex_has_no_bulges() {
        let storage = repeat_storage();
        let instances = occurrences(&storage, 12);
        assert_eq!(instances.len(), 1);

        let mut forward = BubbledBranches::new();
        let mut backward = BubbledBranches::new();
        bubbled_branches_forward(&instances, BRANCH, &mut forward);
        bubbled_branches_backward(&instances, BRANCH, &mut backward);
        assert!(forward[0].is_empty());
        assert!(backward[0].is_empty());
        assert!(!is_block_seed(&forward, &backward));
    }
}
