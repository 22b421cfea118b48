//! Binary map file load/save.
//!
//! Persists the static content of a map – header plus wall geometry. The
//! wall list is a flat array of fixed-width records so a reader can
//! sanity-check the record count against the file length before decoding.
//!
//! Dynamic entities are deliberately not persisted here: their behaviors
//! are live game objects, and the reconstruction path for networked state
//! is [`Map::add_entity_with_index`].

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use bincode::{Decode, Encode, config};
use glam::Vec2;
use thiserror::Error;

use crate::defs::EntityFlags;
use crate::sim::{EntityDef, Map, MapId};
use crate::world::{Aabb, TimeSource, WorldConfig};

/// Four-byte file magic.
const MAGIC: &[u8; 4] = b"MGRD";

/// Bumped whenever the on-disk layout changes.
const VERSION: u32 = 1;

/// Loader / writer errors.
#[derive(Error, Debug)]
pub enum MapFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("file is not a map file (bad magic)")]
    BadMagic,

    #[error("unsupported map file version {0}")]
    BadVersion(u32),

    #[error("map name is not valid UTF-8")]
    BadName,

    #[error("map dimensions {width}x{height} are not positive")]
    BadDimensions { width: f32, height: f32 },

    #[error("wall record {index}: {source}")]
    BadWall {
        index: usize,
        source: bincode::error::DecodeError,
    },

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// One wall on disk (16 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct WallRecord {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl WallRecord {
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec2::new(self.x, self.y), Vec2::new(self.width, self.height))
    }

    pub fn from_bounds(b: &Aabb) -> WallRecord {
        WallRecord {
            x: b.min.x,
            y: b.min.y,
            width: b.width(),
            height: b.height(),
        }
    }
}

/// Parsed map file, decoupled from any live `Map`.
#[derive(Clone, Debug, PartialEq)]
pub struct MapFile {
    pub name: String,
    pub size: Vec2,
    pub walls: Vec<WallRecord>,
}

impl MapFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MapFile, MapFileError> {
        let mut r = BufReader::new(File::open(path)?);

        /*----------- 1. magic + version ---------------------------------*/
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(MapFileError::BadMagic);
        }
        let version = r.read_u32::<LE>()?;
        if version != VERSION {
            return Err(MapFileError::BadVersion(version));
        }

        /*----------- 2. header ------------------------------------------*/
        let name_len = r.read_u16::<LE>()? as usize;
        let mut name_bytes = vec![0u8; name_len];
        r.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes).map_err(|_| MapFileError::BadName)?;

        let width = r.read_f32::<LE>()?;
        let height = r.read_f32::<LE>()?;
        if !(width > 0.0 && height > 0.0) {
            return Err(MapFileError::BadDimensions { width, height });
        }

        /*----------- 3. wall records ------------------------------------*/
        let wall_count = r.read_u32::<LE>()? as usize;
        let cfg = config::standard()
            .with_fixed_int_encoding()
            .with_little_endian();

        let mut walls = Vec::with_capacity(wall_count.min(1 << 16));
        for index in 0..wall_count {
            let record: WallRecord = bincode::decode_from_std_read(&mut r, cfg)
                .map_err(|source| MapFileError::BadWall { index, source })?;
            walls.push(record);
        }

        Ok(MapFile { name, size: Vec2::new(width, height), walls })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MapFileError> {
        let mut w = BufWriter::new(File::create(path)?);

        w.write_all(MAGIC)?;
        w.write_u32::<LE>(VERSION)?;

        debug_assert!(self.name.len() <= u16::MAX as usize, "map name too long");
        w.write_u16::<LE>(self.name.len() as u16)?;
        w.write_all(self.name.as_bytes())?;
        w.write_f32::<LE>(self.size.x)?;
        w.write_f32::<LE>(self.size.y)?;

        w.write_u32::<LE>(self.walls.len() as u32)?;
        let cfg = config::standard()
            .with_fixed_int_encoding()
            .with_little_endian();
        for record in &self.walls {
            bincode::encode_into_std_write(*record, &mut w, cfg)?;
        }

        w.flush()?;
        Ok(())
    }

    /// Snapshot the persistable content of a live map.
    pub fn from_map(map: &Map) -> MapFile {
        let walls = map
            .entities()
            .filter(|&ent| {
                map.flags(ent)
                    .is_some_and(|f| f.contains(EntityFlags::WALL))
            })
            .filter_map(|ent| map.bounds(ent))
            .map(|b| WallRecord::from_bounds(&b))
            .collect();

        MapFile {
            name: map.name().to_owned(),
            size: map.size(),
            walls,
        }
    }
}

/// How loaded wall records become entities – the one point a host
/// customises map reconstruction (invisible barriers, damaging walls, …).
pub trait WallStrategy {
    fn build(&self, bounds: Aabb) -> EntityDef;
}

/// Plain solid walls.
pub struct SolidWalls;

impl WallStrategy for SolidWalls {
    fn build(&self, bounds: Aabb) -> EntityDef {
        EntityDef::wall(bounds)
    }
}

impl Map {
    /// Load a map file and materialise its walls through `walls`.
    pub fn load_from<P: AsRef<Path>>(
        path: P,
        id: MapId,
        config: WorldConfig,
        clock: Box<dyn TimeSource>,
        walls: &dyn WallStrategy,
    ) -> Result<Map, MapFileError> {
        let file = MapFile::load(path)?;
        let mut map = Map::new(id, file.name, file.size, config, clock);
        for record in &file.walls {
            map.add_entity(walls.build(record.bounds()));
        }
        Ok(map)
    }

    /// Write this map's header and wall geometry to `path`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), MapFileError> {
        MapFile::from_map(self).save(path)
    }
}
