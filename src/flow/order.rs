use crate::DecoderError;

/// Number of nucleotide hypotheses evaluated per expansion (A, C, G, T).
pub const NUM_NUCLEOTIDES: usize = 4;
/// Largest flow count a decoder can be configured for.
pub const MAX_FLOWS: usize = 1664;

/// Nucleotide codes in the lane order used throughout the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Nucleotide {
    /// Adenine.
    A = 0,
    /// Cytosine.
    C = 1,
    /// Guanine.
    G = 2,
    /// Thymine.
    T = 3,
}

impl Nucleotide {
    /// All nucleotides in lane order.
    pub const ALL: [Nucleotide; NUM_NUCLEOTIDES] =
        [Nucleotide::A, Nucleotide::C, Nucleotide::G, Nucleotide::T];

    /// Parse an uppercase ASCII base.
    pub fn from_ascii(base: u8) -> Option<Self> {
        match base {
            b'A' => Some(Nucleotide::A),
            b'C' => Some(Nucleotide::C),
            b'G' => Some(Nucleotide::G),
            b'T' => Some(Nucleotide::T),
            _ => None,
        }
    }

    /// Nucleotide for a lane index in `0..4`.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index & 3]
    }

    /// Lane index of the nucleotide.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Uppercase ASCII representation.
    #[inline]
    pub fn to_ascii(self) -> u8 {
        b"ACGT"[self.index()]
    }
}

/// Cyclic nucleotide dispensation order truncated to a fixed number of flows.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowOrder {
    cycle: Vec<Nucleotide>,
    num_flows: usize,
}

impl FlowOrder {
    /// Build a flow order from a nucleotide cycle such as `"TACGTACGTCTGAGCATCGATCGATGTACAGC"`.
    ///
    /// The cycle repeats until `num_flows` flows are covered.
    pub fn new(cycle: &str, num_flows: usize) -> Result<Self, DecoderError> {
        if cycle.is_empty() {
            return Err(DecoderError::EmptyFlowOrder);
        }
        if num_flows == 0 || num_flows > MAX_FLOWS {
            return Err(DecoderError::InvalidFlowCount {
                num_flows,
                max: MAX_FLOWS,
            });
        }
        let cycle = cycle
            .bytes()
            .enumerate()
            .map(|(position, base)| {
                Nucleotide::from_ascii(base).ok_or(DecoderError::InvalidFlowNucleotide {
                    base: base as char,
                    position,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cycle, num_flows })
    }

    /// Number of flows covered by this order.
    #[inline]
    pub fn num_flows(&self) -> usize {
        self.num_flows
    }

    /// Length of one dispensation cycle.
    pub fn cycle_len(&self) -> usize {
        self.cycle.len()
    }

    /// Nucleotide dispensed at `flow`.
    #[inline]
    pub fn nucleotide_at(&self, flow: usize) -> Nucleotide {
        self.cycle[flow % self.cycle.len()]
    }

    /// Lane index of the nucleotide dispensed at `flow`.
    #[inline]
    pub fn nuc_at(&self, flow: usize) -> usize {
        self.nucleotide_at(flow).index()
    }

    /// ASCII base dispensed at `flow`.
    #[inline]
    pub fn base_at(&self, flow: usize) -> u8 {
        self.nucleotide_at(flow).to_ascii()
    }

    /// The dispensation cycle as an ASCII string.
    pub fn cycle_string(&self) -> String {
        self.cycle.iter().map(|nuc| nuc.to_ascii() as char).collect()
    }
}
