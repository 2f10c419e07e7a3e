use std::{
    collections::HashMap,
    fs, io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::Utf8Error,
    sync::Arc,
};

use lru::LruCache;
use noodles::{
    core::{Position, Region},
    fasta::{self, fai},
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::genotype::Chromosome;

const CACHE_CAPACITY: usize = 128 * 1024;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid UTF-8 contig name: {0}")]
    InvalidContigName(#[from] Utf8Error),
    #[error("unknown contig: {query}")]
    UnknownContig { query: String },
    #[error("position {position} is outside contig {contig} length {length}")]
    PositionOutOfBounds {
        contig: String,
        position: u64,
        length: u64,
    },
    #[error("invalid genomic position: {0}")]
    InvalidPosition(#[from] noodles::core::position::TryFromIntError),
}

/// Source of reference bases for VCF export.
pub trait ReferenceProvider {
    /// Upper-case reference base at a 1-based position.
    fn base(&self, chromosome: &Chromosome, position: u64) -> Result<char, ReferenceError>;

    fn contig_length(&self, _chromosome: &Chromosome) -> Option<u64> {
        None
    }
}

impl<T: ReferenceProvider + ?Sized> ReferenceProvider for &T {
    fn base(&self, chromosome: &Chromosome, position: u64) -> Result<char, ReferenceError> {
        (**self).base(chromosome, position)
    }

    fn contig_length(&self, chromosome: &Chromosome) -> Option<u64> {
        (**self).contig_length(chromosome)
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceContig {
    pub name: String,
    pub length: u64,
}

/// Indexed FASTA reference with a shared base cache.
pub struct ReferenceGenome {
    reader: Arc<Mutex<fasta::io::IndexedReader<fasta::io::BufReader<fs::File>>>>,
    contigs: Arc<Vec<ReferenceContig>>,
    by_chromosome: Arc<HashMap<Chromosome, usize>>,
    cache: Arc<Mutex<LruCache<(usize, u64), u8>>>,
}

impl Clone for ReferenceGenome {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
            contigs: Arc::clone(&self.contigs),
            by_chromosome: Arc::clone(&self.by_chromosome),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl ReferenceGenome {
    /// Opens a FASTA file, writing a `.fai` index next to it when none exists.
    pub fn open<P: AsRef<Path>>(path: P, fai_path: Option<PathBuf>) -> Result<Self, ReferenceError> {
        let canonical = fs::canonicalize(path.as_ref())?;

        let index_path = fai_path.unwrap_or_else(|| default_index_path(&canonical));
        let index = if index_path.exists() {
            fai::fs::read(&index_path)?
        } else {
            let index = fasta::fs::index(&canonical)?;
            fai::fs::write(&index_path, &index)?;
            index
        };

        let reader = fasta::io::indexed_reader::Builder::default()
            .set_index(index.clone())
            .build_from_path(&canonical)?;

        let contigs = index
            .as_ref()
            .iter()
            .map(|record| -> Result<ReferenceContig, ReferenceError> {
                let name = std::str::from_utf8(record.name().as_ref())?.to_string();
                Ok(ReferenceContig {
                    name,
                    length: record.length(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let by_chromosome = index_contigs(&contigs);
        tracing::debug!(
            path = %canonical.display(),
            contigs = contigs.len(),
            "opened reference FASTA"
        );

        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            reader: Arc::new(Mutex::new(reader)),
            contigs: Arc::new(contigs),
            by_chromosome: Arc::new(by_chromosome),
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        })
    }

    fn contig_index(&self, chromosome: &Chromosome) -> Result<usize, ReferenceError> {
        self.by_chromosome
            .get(chromosome)
            .copied()
            .ok_or_else(|| ReferenceError::UnknownContig {
                query: chromosome.to_string(),
            })
    }
}

impl ReferenceProvider for ReferenceGenome {
    fn base(&self, chromosome: &Chromosome, position: u64) -> Result<char, ReferenceError> {
        let idx = self.contig_index(chromosome)?;
        let contig = &self.contigs[idx];

        if position == 0 || position > contig.length {
            return Err(ReferenceError::PositionOutOfBounds {
                contig: contig.name.clone(),
                position,
                length: contig.length,
            });
        }

        if let Some(base) = self.cache.lock().get(&(idx, position)).copied() {
            return Ok(char::from(base));
        }

        let pos = usize::try_from(position).map_err(|_| ReferenceError::PositionOutOfBounds {
            contig: contig.name.clone(),
            position,
            length: contig.length,
        })?;
        let start = Position::try_from(pos)?;
        let region = Region::new(contig.name.clone(), start..=start);
        let record = self.reader.lock().query(&region)?;
        let base = record
            .sequence()
            .as_ref()
            .first()
            .copied()
            .unwrap_or(b'N')
            .to_ascii_uppercase();

        self.cache.lock().put((idx, position), base);
        Ok(char::from(base))
    }

    fn contig_length(&self, chromosome: &Chromosome) -> Option<u64> {
        self.contig_index(chromosome)
            .ok()
            .map(|idx| self.contigs[idx].length)
    }
}

/// Reference held entirely in memory, keyed by chromosome.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReference {
    sequences: HashMap<Chromosome, Vec<u8>>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequence(mut self, chromosome: Chromosome, sequence: impl Into<Vec<u8>>) -> Self {
        self.insert(chromosome, sequence);
        self
    }

    pub fn insert(&mut self, chromosome: Chromosome, sequence: impl Into<Vec<u8>>) {
        self.sequences.insert(chromosome, sequence.into());
    }
}

impl ReferenceProvider for InMemoryReference {
    fn base(&self, chromosome: &Chromosome, position: u64) -> Result<char, ReferenceError> {
        let sequence = self
            .sequences
            .get(chromosome)
            .ok_or_else(|| ReferenceError::UnknownContig {
                query: chromosome.to_string(),
            })?;
        let out_of_bounds = || ReferenceError::PositionOutOfBounds {
            contig: chromosome.to_string(),
            position,
            length: sequence.len() as u64,
        };
        let idx = usize::try_from(position)
            .ok()
            .and_then(|p| p.checked_sub(1))
            .ok_or_else(out_of_bounds)?;
        sequence
            .get(idx)
            .map(|b| char::from(b.to_ascii_uppercase()))
            .ok_or_else(out_of_bounds)
    }

    fn contig_length(&self, chromosome: &Chromosome) -> Option<u64> {
        self.sequences.get(chromosome).map(|s| s.len() as u64)
    }
}

fn default_index_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".fai");
    PathBuf::from(s)
}

/// Maps every contig that names a chromosome (`chr1`, `1`, `chrM`, `MT`, ...) to its index.
/// The first contig claiming a chromosome wins.
fn index_contigs(contigs: &[ReferenceContig]) -> HashMap<Chromosome, usize> {
    let mut map = HashMap::new();
    for (idx, contig) in contigs.iter().enumerate() {
        let name = contig.name.split_whitespace().next().unwrap_or_default();
        if let Some(chromosome) = Chromosome::parse(name) {
            map.entry(chromosome).or_insert(idx);
        }
    }
    map
}
