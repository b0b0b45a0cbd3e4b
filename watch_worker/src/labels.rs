use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Reads one class label per line. Lines may carry a trailing `r,g,b` color,
/// which is ignored.
pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    parse_labels(io::BufReader::new(file))
}

fn parse_labels(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let label = line.split(',').next().unwrap_or_default().trim();
        if label.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }
        labels.push(label.to_string());
    }

    Ok(labels)
}
