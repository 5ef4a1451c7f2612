use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use csv::ReaderBuilder;

use crate::types::{Landmark, LandmarkSet, NUM_LANDMARKS};

/// Carga una sesión grabada desde un CSV con formato frame,landmark,x,y,z.
/// Los frames sin filas se interpretan como "sin mano".
pub fn load_session(path: impl AsRef<Path>) -> Result<Vec<Option<LandmarkSet>>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;
    read_session(file).with_context(|| format!("CSV inválido: {:?}", path))
}

pub fn read_session<R: Read>(reader: R) -> Result<Vec<Option<LandmarkSet>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut frames: BTreeMap<usize, [Option<Landmark>; NUM_LANDMARKS]> = BTreeMap::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Fila {} inválida", row))?;
        if record.len() < 5 {
            bail!("La fila {} no tiene 5 columnas", row);
        }

        let frame: usize = record[0]
            .parse()
            .with_context(|| format!("frame inválido en fila {}", row))?;
        let landmark: usize = record[1]
            .parse()
            .with_context(|| format!("landmark inválido en fila {}", row))?;
        ensure!(
            landmark < NUM_LANDMARKS,
            "Landmark {} fuera de rango (fila {})",
            landmark,
            row
        );

        let x: f32 = record[2].parse().with_context(|| format!("x inválido en fila {}", row))?;
        let y: f32 = record[3].parse().with_context(|| format!("y inválido en fila {}", row))?;
        let z: f32 = record[4].parse().with_context(|| format!("z inválido en fila {}", row))?;

        let slots = frames.entry(frame).or_insert([None; NUM_LANDMARKS]);
        ensure!(
            slots[landmark].is_none(),
            "Landmark {} repetido en el frame {} (fila {})",
            landmark,
            frame,
            row
        );
        slots[landmark] = Some(Landmark::new(x, y, z));
    }

    let Some(&max_frame) = frames.keys().next_back() else {
        bail!("El CSV no contiene datos");
    };

    let mut session = vec![None; max_frame + 1];
    for (frame, slots) in frames {
        let mut points = [Landmark::default(); NUM_LANDMARKS];
        for (idx, slot) in slots.iter().enumerate() {
            match slot {
                Some(p) => points[idx] = *p,
                None => bail!("Al frame {} le falta el landmark {}", frame, idx),
            }
        }
        session[frame] = Some(LandmarkSet::new(points));
    }

    Ok(session)
}
