#[cfg(test)]
mod tests {
    use crate::junction::JunctionRecord;
    use crate::storage::JunctionStorage;
    use std::io;

    const K: usize = 5;

    fn rec(chr: u32, id: i32, pos: u32) -> JunctionRecord {
        JunctionRecord { chr, id, pos }
    }

    // One 40 bp chromosome with vertex 2 occurring twice.
    fn toy_storage() -> JunctionStorage {
        let seq = b"ACGTAACCGGTTACGTAACCGGTTACGTAACCGGTTACGT".to_vec();
        let records = vec![rec(0, 1, 0), rec(0, 2, 10), rec(0, 3, 20), rec(0, -2, 30)];
        JunctionStorage::from_parts(&records, vec![("chr1 toy".to_string(), seq)], K, 1)
            .expect("toy storage")
    }

    #[test]
    fn test_shape() {
        let storage = toy_storage();
        assert_eq!(storage.k(), K as i64);
        assert_eq!(storage.chr_count(), 1);
        assert_eq!(storage.chr_size(0), 4);
        assert_eq!(storage.chr_description(0), "chr1 toy");
        assert_eq!(storage.vertices_number(), 4);
        assert_eq!(storage.instances_count(2), 2);
        assert_eq!(storage.instances_count(-2), 2);
        assert_eq!(storage.instances_count(3), 1);
    }

    #[test]
    fn test_sequential_positions() {
        let storage = toy_storage();
        let fwd = storage.seq_iter(0, 1, true);
        assert!(fwd.valid());
        assert_eq!(fwd.vertex_id(), 2);
        assert_eq!(fwd.position(), 10);
        assert_eq!(fwd.abs_position(), 10);

        let rev = fwd.reverse();
        assert_eq!(rev.vertex_id(), -2);
        assert_eq!(rev.position(), 10 + K as i64);
        assert_eq!(rev.abs_position(), 10);

        // Traversal decreases the index on the reverse strand.
        assert_eq!(rev.next().index(), 0);
        assert_eq!(rev.prev().index(), 2);
        assert!(!storage.seq_iter(0, 4, true).valid());
        assert!(!storage.seq_iter(0, -1, true).valid());
    }

    #[test]
    fn test_per_vertex_order_and_strands() {
        let storage = toy_storage();
        let mut it = storage.vertex_iter(2);
        let mut hits = Vec::new();
        while it.valid() {
            hits.push((it.index(), it.is_positive_strand()));
            it = it.next();
        }
        assert_eq!(hits, vec![(1, true), (3, false)]);

        // The opposite sign visits the same occurrences in reverse stored
        // order, with the strand flags flipped.
        let mut it = storage.vertex_iter(-2);
        let mut hits = Vec::new();
        while it.valid() {
            hits.push((it.index(), it.is_positive_strand()));
            it = it.next();
        }
        assert_eq!(hits, vec![(3, true), (1, false)]);
    }

    #[test]
    fn test_sequential_from_vertex_iter() {
        let storage = toy_storage();
        // A negative query starts at the last stored occurrence; the one at
        // idx 3 stores -2, so it reads as -2 on the forward strand.
        let occ = storage.vertex_iter(-2);
        let seq = occ.sequential();
        assert_eq!(seq.vertex_id(), -2);
        assert_eq!(seq.index(), 3);
        assert!(seq.is_positive_strand());

        let seq = occ.next().sequential();
        assert_eq!(seq.vertex_id(), -2);
        assert_eq!(seq.index(), 1);
        assert!(!seq.is_positive_strand());
    }

    #[test]
    fn test_edge_strand_symmetry() {
        let storage = toy_storage();
        for idx in 0..storage.chr_size(0) as i64 - 1 {
            let forward = storage.seq_iter(0, idx, true);
            let outgoing = forward.outgoing_edge();
            assert!(outgoing.length > 0);

            // The same gap seen from the reverse strand is the reversed edge.
            let mirrored = storage.seq_iter(0, idx, false).ingoing_edge().reverse();
            assert_eq!(outgoing.start_vertex, mirrored.start_vertex);
            assert_eq!(outgoing.end_vertex, mirrored.end_vertex);
            assert_eq!(outgoing.ch, mirrored.ch);
            assert_eq!(outgoing.rev_ch, mirrored.rev_ch);
            assert_eq!(outgoing.length, mirrored.length);

            // Ingoing at the successor is the same edge.
            let ingoing = storage.seq_iter(0, idx + 1, true).ingoing_edge();
            assert_eq!(outgoing, ingoing);
        }
    }

    #[test]
    fn test_used_flag_is_shared() {
        let storage = toy_storage();
        let seq = storage.seq_iter(0, 3, true);
        assert!(!seq.used());
        seq.mark_used();
        assert!(seq.used());
        assert!(seq.reverse().used());
        let mut occ = storage.vertex_iter(2);
        occ = occ.next();
        assert_eq!(occ.index(), 3);
        assert!(occ.used());
    }

    #[test]
    fn test_lock_range_smoke() {
        let storage = toy_storage();
        let mut last = (usize::MAX, usize::MAX);
        let mut guards = Vec::new();
        storage.lock_range(
            storage.seq_iter(0, 0, true),
            storage.seq_iter(0, 3, true),
            &mut last,
            &mut guards,
        );
        assert!(!guards.is_empty());
        drop(guards);

        // Dropping the guards releases the stripes for the next commit.
        let mut last = (usize::MAX, usize::MAX);
        let mut guards = Vec::new();
        storage.lock_range(
            storage.seq_iter(0, 1, true),
            storage.seq_iter(0, 2, true),
            &mut last,
            &mut guards,
        );
        drop(guards);
    }

    #[test]
    fn test_unsorted_stream_rejected() {
        let seq = b"ACGTAACCGGTTACGTAACC".to_vec();
        let records = vec![rec(0, 1, 10), rec(0, 2, 5)];
        let err = JunctionStorage::from_parts(&records, vec![("c".to_string(), seq)], K, 1)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_zero_id_rejected() {
        let seq = b"ACGTAACCGGTTACGTAACC".to_vec();
        let records = vec![rec(0, 0, 0)];
        let err = JunctionStorage::from_parts(&records, vec![("c".to_string(), seq)], K, 1)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_fasta_mismatch_rejected() {
        let seq = b"ACGTAACCGGTTACGTAACC".to_vec();
        let records = vec![rec(0, 1, 0), rec(1, 2, 0)];
        let err = JunctionStorage::from_parts(&records, vec![("c".to_string(), seq)], K, 1)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_out_of_range_junction_rejected() {
        let seq = b"ACGTAACC".to_vec();
        let records = vec![rec(0, 1, 6)];
        let err = JunctionStorage::from_parts(&records, vec![("c".to_string(), seq)], K, 1)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
