//! GeoPackage binary geometry (GPB) decoding.
//!
//! Only the extent of a geometry is needed to select tiles, so this reads the
//! envelope from the GPB header when present and otherwise walks the WKB body
//! for its coordinates.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use vbicompare_core::BBox;

use crate::error::{CloudError, Result};

/// Byte order of a header or WKB geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WkbByteOrder {
    LittleEndian,
    BigEndian,
}

impl WkbByteOrder {
    fn from_flag(flag: u8) -> Self {
        if flag & 1 == 1 {
            WkbByteOrder::LittleEndian
        } else {
            WkbByteOrder::BigEndian
        }
    }
}

/// Parsed GPB header.
#[derive(Debug, Clone, PartialEq)]
pub struct GpbHeader {
    pub version: u8,
    pub byte_order: WkbByteOrder,
    pub srs_id: i32,
    pub empty: bool,
    /// `[min_x, max_x, min_y, max_y]` when the header carries one.
    pub envelope: Option<BBox>,
    /// Offset of the WKB body.
    pub wkb_offset: usize,
}

/// Parse the GPB header.
pub fn parse_header(data: &[u8]) -> Result<GpbHeader> {
    if data.len() < 8 {
        return Err(invalid("header too short"));
    }
    if &data[0..2] != b"GP" {
        return Err(invalid("missing 'GP' magic"));
    }

    let version = data[2];
    let flags = data[3];
    let byte_order = WkbByteOrder::from_flag(flags);
    let empty = flags & 0b0001_0000 != 0;

    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        code => return Err(invalid(&format!("invalid envelope indicator {code}"))),
    };

    let srs_id = read_i32(byte_order, &data[4..8]);
    let wkb_offset = 8 + envelope_len;
    if data.len() < wkb_offset {
        return Err(invalid("truncated envelope"));
    }

    let envelope = if envelope_len > 0 {
        let v = |i: usize| read_f64(byte_order, &data[8 + i * 8..16 + i * 8]);
        Some(BBox::new(v(0), v(2), v(1), v(3)))
    } else {
        None
    };

    Ok(GpbHeader {
        version,
        byte_order,
        srs_id,
        empty,
        envelope,
        wkb_offset,
    })
}

/// Extent of a GPB geometry, or `None` for an empty geometry.
pub fn geometry_extent(data: &[u8]) -> Result<Option<BBox>> {
    let header = parse_header(data)?;
    if header.empty {
        return Ok(None);
    }
    // NaN envelopes mark empty geometries too
    if let Some(env) = header.envelope {
        if env.min_x.is_nan() {
            return Ok(None);
        }
        return Ok(Some(env));
    }
    wkb_extent(&data[header.wkb_offset..])
}

/// Extent of every coordinate in a WKB geometry.
pub fn wkb_extent(wkb: &[u8]) -> Result<Option<BBox>> {
    let mut reader = WkbReader { data: wkb, pos: 0 };
    let mut extent: Option<BBox> = None;
    reader.geometry(&mut extent, 0)?;
    Ok(extent)
}

const MAX_NESTING: usize = 8;

/// EWKB: a 4-byte SRID follows the type.
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

struct WkbReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WkbReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| invalid("truncated WKB"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, order: WkbByteOrder) -> Result<u32> {
        Ok(read_u32(order, self.take(4)?))
    }

    fn geometry(&mut self, extent: &mut Option<BBox>, depth: usize) -> Result<()> {
        if depth > MAX_NESTING {
            return Err(invalid("geometry nested too deeply"));
        }

        let order = match self.take(1)?[0] {
            0 => WkbByteOrder::BigEndian,
            1 => WkbByteOrder::LittleEndian,
            b => return Err(invalid(&format!("invalid WKB byte order {b}"))),
        };

        let raw_type = self.u32(order)?;
        // EWKB flags, then ISO thousands
        let mut dims = 2;
        if raw_type & 0x8000_0000 != 0 {
            dims += 1;
        }
        if raw_type & 0x4000_0000 != 0 {
            dims += 1;
        }
        if raw_type & EWKB_SRID_FLAG != 0 {
            self.take(4)?;
        }
        let iso = raw_type & 0x0FFF_FFFF;
        dims += match iso / 1000 {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(invalid(&format!("unknown WKB type {raw_type}"))),
        };

        match iso % 1000 {
            1 => self.points(order, dims, 1, extent),
            2 => {
                let n = self.u32(order)? as usize;
                self.points(order, dims, n, extent)
            }
            3 => {
                let rings = self.u32(order)?;
                for _ in 0..rings {
                    let n = self.u32(order)? as usize;
                    self.points(order, dims, n, extent)?;
                }
                Ok(())
            }
            4..=7 => {
                let parts = self.u32(order)?;
                for _ in 0..parts {
                    self.geometry(extent, depth + 1)?;
                }
                Ok(())
            }
            _ => Err(invalid(&format!("unsupported WKB type {raw_type}"))),
        }
    }

    fn points(&mut self, order: WkbByteOrder, dims: usize, n: usize, extent: &mut Option<BBox>) -> Result<()> {
        for _ in 0..n {
            let coords = self.take(dims * 8)?;
            let x = read_f64(order, &coords[0..8]);
            let y = read_f64(order, &coords[8..16]);
            // empty points are encoded as NaN
            if x.is_nan() || y.is_nan() {
                continue;
            }
            *extent = Some(match extent {
                None => BBox::new(x, y, x, y),
                Some(b) => BBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            });
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> CloudError {
    CloudError::InvalidGeometry(reason.to_string())
}

fn read_u32(order: WkbByteOrder, data: &[u8]) -> u32 {
    match order {
        WkbByteOrder::LittleEndian => LittleEndian::read_u32(data),
        WkbByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}

fn read_i32(order: WkbByteOrder, data: &[u8]) -> i32 {
    match order {
        WkbByteOrder::LittleEndian => LittleEndian::read_i32(data),
        WkbByteOrder::BigEndian => BigEndian::read_i32(data),
    }
}

fn read_f64(order: WkbByteOrder, data: &[u8]) -> f64 {
    match order {
        WkbByteOrder::LittleEndian => LittleEndian::read_f64(data),
        WkbByteOrder::BigEndian => BigEndian::read_f64(data),
    }
}
