use std::{
    fs::{self, File},
    io::Read,
    path::Path,
};

use crate::error::{ClientError, result::ClientResultHelper};

/// Read all bytes from a file
pub fn read_bytes_from_file(file: &impl AsRef<Path>) -> Result<Vec<u8>, ClientError> {
    let mut buffer = Vec::new();
    File::open(file)
        .with_context(|| format!("could not open the file {}", file.as_ref().display()))?
        .read_to_end(&mut buffer)
        .with_context(|| format!("could not read the file {}", file.as_ref().display()))?;

    Ok(buffer)
}

/// Write all bytes to a file
pub fn write_bytes_to_file(bytes: &[u8], file: &impl AsRef<Path>) -> Result<(), ClientError> {
    fs::write(file, bytes).with_context(|| {
        format!(
            "failed writing {} bytes to {}",
            bytes.len(),
            file.as_ref().display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{read_bytes_from_file, write_bytes_to_file};

    #[test]
    fn test_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        write_bytes_to_file(&[0, 1, 2, 255], &path).unwrap();
        assert_eq!(read_bytes_from_file(&path).unwrap(), vec![0, 1, 2, 255]);

        let missing = dir.path().join("missing.bin");
        let err = read_bytes_from_file(&missing).unwrap_err().to_string();
        assert!(err.starts_with("could not open the file"));
    }
}
