use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use crate::Error;
use crate::filters::FilterKind;
use crate::histogram::normalized_median;

/// Sub-range of an ordered reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Diapason {
    All,
    Low,
    Mid,
    High,
}

impl Diapason {
    /// Diapasons explored by the variant search. `All` is kept for direct
    /// processing.
    pub const SEARCH: [Diapason; 3] = [Diapason::Low, Diapason::Mid, Diapason::High];

    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }

    /// Index range into a list of `size` references, cut at 33% and 66%.
    /// Never empty for a non-empty list: a slice that would round to nothing
    /// is widened to the one reference at its start.
    pub fn range(&self, size: usize) -> Range<usize> {
        let third = (size as f64 * 0.33) as usize;
        let two_thirds = (size as f64 * 0.66) as usize;
        let (start, end) = match self {
            Self::All => (0, size),
            Self::Low => (0, third),
            Self::Mid => (third, two_thirds),
            Self::High => (two_thirds, size),
        };
        if end > start || size == 0 {
            return start..end;
        }
        let start = start.min(size - 1);
        start..start + 1
    }
}

impl fmt::Display for Diapason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Diapason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "low" => Ok(Self::Low),
            "mid" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            _ => Err(Error::InvalidParameter(s.to_string())),
        }
    }
}

/// One target distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub id: u32,
    /// Share of the training photos this reference stands for.
    pub popularity: f64,
    /// Mean distance of this reference to the rest of its corpus.
    pub average_error: f64,
    pub data: Vec<f64>,
}

impl Reference {
    /// Median of the distribution on the unit domain.
    /// Whether popularity, average error and every bucket are finite.
    pub fn is_finite(&self) -> bool {
        self.popularity.is_finite()
            && self.average_error.is_finite()
            && self.data.iter().all(|v| v.is_finite())
    }

    pub fn median(&self) -> f64 {
        normalized_median(&self.data, 0.5)
    }
}

/// Ordered references of one filter kind with their median spread.
#[derive(Debug, Clone)]
pub struct References {
    refs: Vec<Reference>,
    median_min: f64,
    median_max: f64,
}

impl References {
    pub fn new(refs: Vec<Reference>) -> Self {
        let (median_min, median_max) = if refs.is_empty() {
            (0.0, 1.0)
        } else {
            refs.iter()
                .map(Reference::median)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| {
                    (lo.min(m), hi.max(m))
                })
        };
        Self {
            refs,
            median_min,
            median_max,
        }
    }

    pub fn as_slice(&self) -> &[Reference] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn median_min(&self) -> f64 {
        self.median_min
    }

    pub fn median_max(&self) -> f64 {
        self.median_max
    }

    /// Largest median difference at which two results count as the same.
    pub fn median_quantum(&self) -> f64 {
        (self.median_max - self.median_min) / 18.0
    }

    /// References a search restricted to `diapason` may match.
    pub fn slice(&self, diapason: Diapason) -> &[Reference] {
        &self.refs[diapason.range(self.refs.len())]
    }
}

/// Serialize references: `u32 count, u32 buckets`, then per reference
/// `u32 id, f64 popularity, f64 average_error, buckets × f64`, little-endian.
pub fn write_references<W: Write>(mut out: W, refs: &[Reference]) -> Result<(), Error> {
    let buckets = refs.first().map_or(0, |r| r.data.len());
    out.write_all(&(refs.len() as u32).to_le_bytes())?;
    out.write_all(&(buckets as u32).to_le_bytes())?;
    for r in refs {
        if r.data.len() != buckets {
            return Err(Error::InvalidReference {
                id: r.id,
                expected: buckets,
                actual: r.data.len(),
            });
        }
        out.write_all(&r.id.to_le_bytes())?;
        out.write_all(&r.popularity.to_le_bytes())?;
        out.write_all(&r.average_error.to_le_bytes())?;
        for v in &r.data {
            out.write_all(&v.to_le_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_f64<R: Read>(input: &mut R) -> io::Result<f64> {
    let mut bytes = [0u8; 8];
    input.read_exact(&mut bytes)?;
    Ok(f64::from_le_bytes(bytes))
}

fn read_reference<R: Read>(input: &mut R, buckets: usize) -> io::Result<Reference> {
    let id = read_u32(input)?;
    let popularity = read_f64(input)?;
    let average_error = read_f64(input)?;
    let data = (0..buckets)
        .map(|_| read_f64(input))
        .collect::<io::Result<Vec<f64>>>()?;
    Ok(Reference {
        id,
        popularity,
        average_error,
        data,
    })
}

/// Read the format written by [`write_references`].
pub fn read_references<R: Read>(mut input: R) -> Result<Vec<Reference>, Error> {
    let count = read_u32(&mut input)? as usize;
    let buckets = read_u32(&mut input)? as usize;
    let mut refs = Vec::with_capacity(count.min(4096));
    for index in 0..count {
        match read_reference(&mut input, buckets) {
            Ok(r) => refs.push(r),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::TruncatedCorpus { index, count });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(refs)
}

fn load_kind(dir: &Path, kind: FilterKind) -> Result<Vec<Reference>, Error> {
    let path = dir.join(format!("{}.ref", kind.file_stem()));
    let file = File::open(&path).map_err(|source| Error::CorpusFile {
        path: path.clone(),
        source,
    })?;
    let refs = read_references(BufReader::new(file))?;
    log::info!("{kind}: {} references from {}", refs.len(), path.display());
    Ok(refs)
}

/// Reference sets for all four filter kinds. Loaded once, then shared
/// read-only by every search.
#[derive(Debug, Clone)]
pub struct Corpus {
    sets: [References; 4],
}

impl Corpus {
    /// Validate and index the four reference lists.
    pub fn new(
        details: Vec<Reference>,
        zonal: Vec<Reference>,
        saturation: Vec<Reference>,
        luminance: Vec<Reference>,
    ) -> Result<Self, Error> {
        let lists = [details, zonal, saturation, luminance];
        for (kind, refs) in FilterKind::ALL.iter().zip(&lists) {
            if refs.is_empty() {
                return Err(Error::EmptyCorpus(*kind));
            }
            if let Some(bad) = refs.iter().find(|r| r.data.len() != kind.bucket_count()) {
                return Err(Error::CorpusShape {
                    kind: *kind,
                    expected: kind.bucket_count(),
                    actual: bad.data.len(),
                });
            }
            if let Some(bad) = refs.iter().find(|r| !r.is_finite()) {
                return Err(Error::NonFiniteReference {
                    kind: *kind,
                    id: bad.id,
                });
            }
        }
        let [details, zonal, saturation, luminance] = lists;
        Ok(Self {
            sets: [
                References::new(details),
                References::new(zonal),
                References::new(saturation),
                References::new(luminance),
            ],
        })
    }

    /// Load `details.ref`, `zonal.ref`, `saturation.ref` and `luminance.ref`
    /// from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let [details, zonal, saturation, luminance] =
            FilterKind::ALL.map(|kind| load_kind(dir, kind));
        Self::new(details?, zonal?, saturation?, luminance?)
    }

    /// Write the four reference files into `dir`.
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<(), Error> {
        let dir = dir.as_ref();
        for kind in FilterKind::ALL {
            let path = dir.join(format!("{}.ref", kind.file_stem()));
            let file = File::create(&path).map_err(|source| Error::CorpusFile {
                path: path.clone(),
                source,
            })?;
            write_references(BufWriter::new(file), self.references(kind).as_slice())?;
        }
        Ok(())
    }

    pub fn references(&self, kind: FilterKind) -> &References {
        &self.sets[kind.index()]
    }
}
