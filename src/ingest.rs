//! Sensor line parsing
//!
//! Two textual forms are accepted:
//! - bare samples: `ax,ay,az,gx,gy,gz`
//! - side-tagged samples: `side,ax,ay,az,gx,gy,gz` with side `0` (left) or `1` (right)

use crate::error::SampleError;
use crate::types::{Channel, Sample};
use crate::FEATURES_PER_SAMPLE;

/// Parse a bare six-value sample line
pub fn parse_sample(line: &str) -> Result<Sample, SampleError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != FEATURES_PER_SAMPLE {
        return Err(SampleError::FieldCount {
            expected: FEATURES_PER_SAMPLE,
            actual: fields.len(),
        });
    }
    parse_values(&fields, 0)
}

/// Parse a side-tagged sample line
pub fn parse_tagged_sample(line: &str) -> Result<(Channel, Sample), SampleError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != FEATURES_PER_SAMPLE + 1 {
        return Err(SampleError::FieldCount {
            expected: FEATURES_PER_SAMPLE + 1,
            actual: fields.len(),
        });
    }

    let channel = parse_side(fields[0])?;
    let sample = parse_values(&fields[1..], 1)?;
    Ok((channel, sample))
}

/// Side ids may be written as integers or floats (`0`, `1.0`)
fn parse_side(field: &str) -> Result<Channel, SampleError> {
    let field = field.trim();
    let side = field
        .parse::<f64>()
        .map_err(|_| SampleError::UnknownSide(field.to_string()))?;
    if side == 0.0 {
        Ok(Channel::Left)
    } else if side == 1.0 {
        Ok(Channel::Right)
    } else {
        Err(SampleError::UnknownSide(field.to_string()))
    }
}

fn parse_values(fields: &[&str], offset: usize) -> Result<Sample, SampleError> {
    let mut values = [0.0; FEATURES_PER_SAMPLE];
    for (i, field) in fields.iter().enumerate() {
        let field = field.trim();
        values[i] = match field.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(SampleError::NotNumeric {
                    index: i + offset,
                    value: field.to_string(),
                })
            }
        };
    }
    Ok(Sample::new(values))
}
