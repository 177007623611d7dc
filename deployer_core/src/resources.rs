//! Kubernetes resource quantities and the unit grammar used to parse them.
//!
//! Grounded in the teacher's `structs::resources` module: a generic
//! `Resources<T>` that starts life as raw strings off a manifest and
//! normalises into an all-`f64` form that supports `+` so pool totals and
//! per-model asks can be compared and summed directly.

use crate::{ErrorKind, Result};

/// A normalised resource ask: cores, gibibytes, and a whole GPU count.
///
/// This is the triple the Placement Engine and Resource Inventory both
/// operate on (spec.md §4.3/§4.8); `Resources<f64>` tracks requests and
/// limits separately (mirroring the teacher's `ResourceRequest`/`ResourceLimit`
/// split) while `ResourceAsk` is the already-resolved one used for admission.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct ResourceAsk {
    pub cpu_cores: f64,
    pub mem_gib: f64,
    pub gpu_count: u32,
}

impl ResourceAsk {
    /// True if `self` fits within `available`, component-wise.
    ///
    /// GPU is exact-or-none: a pool with zero GPUs never satisfies a
    /// nonzero GPU ask (spec.md §4.3 step 2).
    pub fn fits_in(&self, available: &ResourceAsk) -> bool {
        if self.gpu_count > 0 && available.gpu_count == 0 {
            return false;
        }
        available.cpu_cores >= self.cpu_cores
            && available.mem_gib >= self.mem_gib
            && available.gpu_count >= self.gpu_count
    }
}

/// Kubernetes resource requests, generic over the representation (raw
/// strings off a manifest, or normalised `f64`s).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResourceRequest<T> {
    pub cpu: T,
    pub memory: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<T>,
}

/// Kubernetes resource limits, generic over the representation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResourceLimit<T> {
    pub cpu: T,
    pub memory: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<T>,
}

/// Requests + limits for one container, as declared in a manifest.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Resources<T> {
    pub requests: ResourceRequest<T>,
    pub limits: ResourceLimit<T>,
}

impl Resources<String> {
    /// Convert shorthand strings (e.g. `"500m"`, `"2Gi"`) into cores and bytes.
    pub fn normalised(&self) -> Result<Resources<f64>> {
        let requests = ResourceRequest {
            cpu: parse_cpu(&self.requests.cpu)?,
            memory: parse_memory(&self.requests.memory)?,
            gpu: self.requests.gpu.as_deref().map(parse_gpu).transpose()?,
        };
        let limits = ResourceLimit {
            cpu: parse_cpu(&self.limits.cpu)?,
            memory: parse_memory(&self.limits.memory)?,
            gpu: self.limits.gpu.as_deref().map(parse_gpu).transpose()?,
        };
        Ok(Resources { requests, limits })
    }
}

impl Resources<f64> {
    /// The ask this container contributes, using limits or requests
    /// depending on the Placement Engine's `use_limits` flag (spec.md §4.3).
    pub fn ask(&self, use_limits: bool) -> ResourceAsk {
        let (cpu_cores, mem_bytes, gpu) = if use_limits {
            (self.limits.cpu, self.limits.memory, self.limits.gpu)
        } else {
            (self.requests.cpu, self.requests.memory, self.requests.gpu)
        };
        ResourceAsk {
            cpu_cores,
            mem_gib: mem_bytes / GIB,
            gpu_count: gpu.unwrap_or(0.0).round() as u32,
        }
    }
}

const KI: f64 = 1024.0;
const MI: f64 = KI * 1024.0;
const GIB: f64 = MI * 1024.0;
const TI: f64 = GIB * 1024.0;
const PI: f64 = TI * 1024.0;
const EI: f64 = PI * 1024.0;
const K: f64 = 1000.0;
const M: f64 = K * 1000.0;
const G: f64 = M * 1000.0;
const T: f64 = G * 1000.0;
const P: f64 = T * 1000.0;
const E: f64 = P * 1000.0;

/// Parse a Kubernetes memory quantity into bytes.
///
/// Exact grammar (spec.md §4.3): `Ki,Mi,Gi,Ti,Pi,Ei` are binary (1024^n),
/// `K,k,M,G,T,P,E` are decimal (1000^n), and a bare number is bytes. An
/// unrecognised suffix logs a warning and is treated as zero rather than
/// failing the whole parse, matching the teacher's tolerant style for
/// malformed cluster data.
pub fn parse_memory(s: &str) -> Result<f64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let unit: String = s.chars().skip_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let n: f64 = if digits.is_empty() { 0.0 } else { digits.parse()? };
    let mult = match unit.as_str() {
        "Ki" => KI,
        "Mi" => MI,
        "Gi" => GIB,
        "Ti" => TI,
        "Pi" => PI,
        "Ei" => EI,
        "K" | "k" => K,
        "M" => M,
        "G" => G,
        "T" => T,
        "P" => P,
        "E" => E,
        "" => 1.0,
        other => {
            warn!("Unknown memory unit '{}' in quantity '{}', treating as 0", other, s);
            return Ok(0.0);
        }
    };
    Ok(n * mult)
}

/// Parse a Kubernetes CPU quantity into cores.
///
/// `m` is millicores, a bare number is cores. Unknown suffix -> 0 with a
/// logged warning (spec.md §4.3).
pub fn parse_cpu(s: &str) -> Result<f64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let unit: String = s.chars().skip_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let n: f64 = if digits.is_empty() { 0.0 } else { digits.parse()? };
    let cores = match unit.as_str() {
        "m" => n / 1000.0,
        "" => n,
        other => {
            warn!("Unknown cpu unit '{}' in quantity '{}', treating as 0", other, s);
            0.0
        }
    };
    Ok(round2(cores))
}

/// Parse an integer extended-resource quantity (e.g. `nvidia.com/gpu: "2"`).
fn parse_gpu(s: &str) -> Result<f64> {
    s.trim().parse::<f64>().chain_err(|| ErrorKind::ConfigError(format!("invalid gpu quantity '{}'", s)))
}

/// Round half-away-from-zero to 2 decimals, as spec.md §4.3 requires for CPU totals.
pub fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Format a byte count back into its canonical quantity string, for display
/// and for round-tripping through `parse_memory` (spec.md §4.3/§8: `parse
/// . format` is identity).
///
/// Picks the largest binary suffix that divides `bytes` exactly and renders
/// the quotient as a bare integer, falling back to a bare byte count when no
/// suffix divides evenly. `{:.2}Gi`-style rounding would lose information
/// for anything smaller than a few gibibytes, so there is no fixed suffix.
pub fn format_memory(bytes: f64) -> String {
    let n = bytes.round() as i64;
    if n == 0 {
        return "0".to_string();
    }
    const UNITS: [(f64, &str); 6] = [(EI, "Ei"), (PI, "Pi"), (TI, "Ti"), (GIB, "Gi"), (MI, "Mi"), (KI, "Ki")];
    for (size, suffix) in UNITS.iter() {
        if (n as f64) % size == 0.0 {
            return format!("{}{}", (n as f64 / size) as i64, suffix);
        }
    }
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_binary_suffixes() {
        assert_eq!(parse_memory("1Ki").unwrap(), 1024.0);
        assert_eq!(parse_memory("1Mi").unwrap(), 1024.0 * 1024.0);
        assert_eq!(parse_memory("2Gi").unwrap(), 2.0 * GIB);
    }

    #[test]
    fn memory_decimal_suffixes() {
        assert_eq!(parse_memory("1k").unwrap(), 1000.0);
        assert_eq!(parse_memory("1M").unwrap(), 1_000_000.0);
        assert_eq!(parse_memory("1G").unwrap(), 1_000_000_000.0);
    }

    #[test]
    fn memory_bare_bytes() {
        assert_eq!(parse_memory("512").unwrap(), 512.0);
        assert_eq!(parse_memory("0").unwrap(), 0.0);
    }

    #[test]
    fn memory_unknown_suffix_is_zero() {
        assert_eq!(parse_memory("5Zz").unwrap(), 0.0);
    }

    #[test]
    fn cpu_millicores_and_cores() {
        assert_eq!(parse_cpu("500m").unwrap(), 0.5);
        assert_eq!(parse_cpu("2").unwrap(), 2.0);
        assert_eq!(parse_cpu("2.5").unwrap(), 2.5);
    }

    #[test]
    fn cpu_rounds_to_two_decimals() {
        assert_eq!(parse_cpu("333m").unwrap(), 0.33);
    }

    #[test]
    fn ask_fits_in_is_component_wise_monotone() {
        let avail = ResourceAsk { cpu_cores: 4.0, mem_gib: 16.0, gpu_count: 1 };
        let fits = ResourceAsk { cpu_cores: 2.0, mem_gib: 8.0, gpu_count: 1 };
        assert!(fits.fits_in(&avail));
        let smaller = ResourceAsk { cpu_cores: 1.0, mem_gib: 4.0, gpu_count: 1 };
        assert!(smaller.fits_in(&avail));
        let too_big = ResourceAsk { cpu_cores: 8.0, mem_gib: 8.0, gpu_count: 1 };
        assert!(!too_big.fits_in(&avail));
    }

    #[test]
    fn gpu_ask_never_fits_gpu_less_pool() {
        let avail = ResourceAsk { cpu_cores: 100.0, mem_gib: 500.0, gpu_count: 0 };
        let ask = ResourceAsk { cpu_cores: 1.0, mem_gib: 1.0, gpu_count: 1 };
        assert!(!ask.fits_in(&avail));
    }

    #[test]
    fn memory_round_trips_exactly() {
        for n in &[0u64, 1, 1024, 1024 * 1024, 3 * 1024 * 1024 * 1024, 1536] {
            let bytes = *n as f64;
            let back = parse_memory(&format_memory(bytes)).unwrap();
            assert_eq!(back, bytes, "round trip failed for {} via {:?}", n, format_memory(bytes));
        }
    }

    #[test]
    fn memory_format_picks_largest_exact_suffix() {
        assert_eq!(format_memory(0.0), "0");
        assert_eq!(format_memory(1.0), "1");
        assert_eq!(format_memory(1024.0), "1Ki");
        assert_eq!(format_memory(1024.0 * 1024.0), "1Mi");
        assert_eq!(format_memory(3.0 * GIB), "3Gi");
        assert_eq!(format_memory(1536.0), "1536");
    }
}
