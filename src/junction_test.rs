#[cfg(test)]
mod tests {
    use crate::junction::{JunctionReader, JunctionRecord, JunctionWriter, RECORD_SIZE};
    use std::io::{self, Cursor};

    fn sample_records() -> Vec<JunctionRecord> {
        vec![
            JunctionRecord { chr: 0, id: 1, pos: 0 },
            JunctionRecord { chr: 0, id: -2, pos: 30 },
            JunctionRecord { chr: 1, id: 2, pos: 5 },
        ]
    }

    #[test]
    fn test_roundtrip() -> io::Result<()> {
        let mut buf = Vec::new();
        {
            let mut writer = JunctionWriter::new(&mut buf);
            for record in sample_records() {
                writer.write_junction(&record)?;
            }
            writer.finish()?;
        }
        assert_eq!(buf.len(), sample_records().len() * RECORD_SIZE);

        let records = JunctionReader::new(Cursor::new(buf)).read_all()?;
        assert_eq!(records, sample_records());
        Ok(())
    }

    #[test]
    fn test_empty_stream() -> io::Result<()> {
        let mut reader = JunctionReader::new(Cursor::new(Vec::new()));
        assert_eq!(reader.next_junction()?, None);
        Ok(())
    }

    #[test]
    fn test_truncated_stream() -> io::Result<()> {
        let mut buf = Vec::new();
        {
            let mut writer = JunctionWriter::new(&mut buf);
            writer.write_junction(&JunctionRecord { chr: 0, id: 7, pos: 12 })?;
            writer.finish()?;
        }
        buf.truncate(RECORD_SIZE - 5);

        let mut reader = JunctionReader::new(Cursor::new(buf));
        let err = reader.next_junction().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        Ok(())
    }

    #[test]
    fn test_truncation_inside_first_field() {
        let buf = vec![0u8; 2];
        let mut reader = JunctionReader::new(Cursor::new(buf));
        let err = reader.next_junction().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
