//! Determines which paths present in the previous manifest are absent
//! from the current one, via a two-pointer merge over two path-sorted
//! streams. Both inputs must already be sorted ascending by path.

use crate::error::Result;
use crate::manifest::ManifestReader;

/// Returns every path present in `previous` but not in `current`, in
/// ascending order.
pub fn removed_paths<P, C>(mut previous: ManifestReader<P>, mut current: ManifestReader<C>) -> Result<Vec<String>>
where
    P: std::io::BufRead,
    C: std::io::BufRead,
{
    let mut removed = Vec::new();
    let mut prev_entry = previous.read_entry()?;
    let mut cur_entry = current.read_entry()?;

    loop {
        match (&prev_entry, &cur_entry) {
            (None, _) => break,
            (Some(p), None) => {
                removed.push(p.path.clone());
                prev_entry = previous.read_entry()?;
            }
            (Some(p), Some(c)) => match p.path.cmp(&c.path) {
                std::cmp::Ordering::Less => {
                    removed.push(p.path.clone());
                    prev_entry = previous.read_entry()?;
                }
                std::cmp::Ordering::Equal => {
                    prev_entry = previous.read_entry()?;
                    cur_entry = current.read_entry()?;
                }
                std::cmp::Ordering::Greater => {
                    cur_entry = current.read_entry()?;
                }
            },
        }
    }
    Ok(removed)
}
