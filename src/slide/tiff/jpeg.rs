//! Abbreviated JPEG tiles.
//!
//! Aperio and many pyramidal TIFF writers store the quantization and Huffman
//! tables once, in the JPEGTables tag, and strip them from every tile.
//! Decoding a tile means splicing the two streams:
//!
//! ```text
//! tables  SOI DQT DHT EOI
//! tile    SOI SOF SOS ... EOI
//! merged  SOI DQT DHT SOF SOS ... EOI
//! ```

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const DQT: u8 = 0xDB;

/// Whether `tile` carries its own quantization tables.
fn has_tables(tile: &[u8]) -> bool {
    tile.windows(2).any(|w| w == [0xFF, DQT])
}

/// Complete stream for `tile`, splicing in `tables` when the tile lacks them.
pub fn complete_tile_stream(tables: Option<&[u8]>, tile: &[u8]) -> Vec<u8> {
    let Some(tables) = tables.filter(|t| !t.is_empty()) else {
        return tile.to_vec();
    };
    if !tile.starts_with(&SOI) || has_tables(tile) {
        return tile.to_vec();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let mut merged = Vec::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(&tile[SOI.len()..]);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splices_tables_into_abbreviated_tile() {
        let tables = [0xFF, 0xD8, 0xFF, 0xDB, 0x01, 0xFF, 0xD9];
        let tile = [0xFF, 0xD8, 0xFF, 0xDA, 0x02, 0xFF, 0xD9];

        assert_eq!(
            complete_tile_stream(Some(&tables), &tile),
            vec![0xFF, 0xD8, 0xFF, 0xDB, 0x01, 0xFF, 0xDA, 0x02, 0xFF, 0xD9]
        );
    }

    #[test]
    fn test_complete_tile_passes_through() {
        let tables = [0xFF, 0xD8, 0xFF, 0xDB, 0x01, 0xFF, 0xD9];
        let tile = [0xFF, 0xD8, 0xFF, 0xDB, 0x09, 0xFF, 0xDA, 0xFF, 0xD9];

        assert_eq!(complete_tile_stream(Some(&tables), &tile), tile.to_vec());
        assert_eq!(complete_tile_stream(None, &tile[..2]), vec![0xFF, 0xD8]);
        assert_eq!(complete_tile_stream(Some(&[]), &tile), tile.to_vec());
    }
}
