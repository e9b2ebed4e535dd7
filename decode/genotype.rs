// ========================================================================================
//                                   Genotype decoder
// ========================================================================================

use crate::types::MISSING;

pub const MISSING_ALLELE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genotype {
    pub is_called: bool,
    pub is_phased: bool,
    pub alleles: Vec<i64>,
}

/// Decodes a GT token into exactly `ploidy` allele slots.
///
/// Returns the offending allele token when one is neither digits nor `.`.
pub fn decode_gt(raw: Option<&str>, ploidy: usize) -> Result<Genotype, String> {
    let mut alleles = vec![MISSING_ALLELE; ploidy];
    let (is_called, is_phased) = decode_gt_into(raw, &mut alleles)?;
    Ok(Genotype {
        is_called,
        is_phased,
        alleles,
    })
}

/// Writes allele indices into `out`, padding with `-1` and dropping extra alleles.
/// Returns `(is_called, is_phased)`.
pub fn decode_gt_into(raw: Option<&str>, out: &mut [i64]) -> Result<(bool, bool), String> {
    out.fill(MISSING_ALLELE);
    let token = match raw {
        Some(token) if !token.is_empty() && token != MISSING => token,
        _ => return Ok((false, false)),
    };

    let is_phased = token.contains('|');
    let mut is_called = true;
    for (i, allele) in token.split(['/', '|']).enumerate() {
        let index = if allele == MISSING || allele.is_empty() {
            is_called = false;
            MISSING_ALLELE
        } else if allele.bytes().all(|b| b.is_ascii_digit()) {
            lexical_core::parse::<i64>(allele.as_bytes()).map_err(|_| allele.to_string())?
        } else {
            return Err(allele.to_string());
        };
        if let Some(slot) = out.get_mut(i) {
            *slot = index;
        }
    }
    Ok((is_called, is_phased))
}
