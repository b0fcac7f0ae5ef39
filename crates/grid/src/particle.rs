//! Particle data structures using struct-of-arrays layout.

/// Particle species discriminator.
///
/// Used to distinguish the high-resolution subset (which defines the zoom
/// region) from the rest, and gas from collisionless matter when counting
/// cell occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Species {
    /// Gas (takes part in hydro and gravity interactions)
    Gas = 0,
    /// Low-resolution collisionless matter (gravity only)
    DarkMatter = 1,
    /// High-resolution collisionless matter; defines the zoom region
    HighResDarkMatter = 2,
}

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle. Positions and masses are `f64` so that the zoom-region bounds
/// and centre of mass stay exact over cosmological box sizes.
#[derive(Debug, Clone, Default)]
pub struct ParticleSet {
    /// X positions
    pub x: Vec<f64>,
    /// Y positions
    pub y: Vec<f64>,
    /// Z positions
    pub z: Vec<f64>,
    /// Particle masses
    pub mass: Vec<f64>,
    /// Species tag
    pub species: Vec<Species>,
}

impl ParticleSet {
    /// Create an empty particle collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a single particle.
    pub fn push(&mut self, px: f64, py: f64, pz: f64, mass: f64, species: Species) {
        self.x.push(px);
        self.y.push(py);
        self.z.push(pz);
        self.mass.push(mass);
        self.species.push(species);
    }

    /// Position of particle `i`.
    #[inline]
    pub fn position(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }

    /// Iterate over the high-resolution subset as `(position, mass)` pairs.
    pub fn high_res(&self) -> impl Iterator<Item = ([f64; 3], f64)> + '_ {
        (0..self.len()).filter_map(move |i| {
            if self.species[i] == Species::HighResDarkMatter {
                Some((self.position(i), self.mass[i]))
            } else {
                None
            }
        })
    }
}
