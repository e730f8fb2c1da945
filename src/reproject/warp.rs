use crate::model::ReprojectConfig;
use anyhow::{Context, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::raster::RasterCreationOptions;
use gdal::{Dataset, DriverManager, Metadata};
use std::path::{Path, PathBuf};

/// Points sampled along each raster edge when deriving the warped bounds;
/// corner-only sampling underestimates bounds on curved grid edges.
const EDGE_SAMPLES: usize = 21;

/// Reproject one raster: open `input`, resolve the configured data variable
/// to its subdataset when the container has one, stamp the source CRS, and
/// warp into a GeoTIFF next to the other outputs. Overwrites any existing
/// output for the same input.
pub fn reproject_file(input: &Path, cfg: &ReprojectConfig) -> Result<PathBuf> {
    let container =
        Dataset::open(input).with_context(|| format!("opening {}", input.display()))?;
    let source = match subdataset_for(&subdataset_entries(&container), &cfg.variable) {
        Some(name) => {
            Dataset::open(&name).with_context(|| format!("opening subdataset {name}"))?
        }
        None => container,
    };

    let src_srs = spatial_ref(&cfg.src_crs)?;
    let dst_srs = spatial_ref(&cfg.dst_crs)?;

    // The archive's files carry grid coordinates but not always a usable CRS,
    // so the configured source CRS is authoritative. The copy lives in the
    // MEM driver because the NetCDF dataset is read-only.
    let mem = DriverManager::get_driver_by_name("MEM").context("loading MEM driver")?;
    let mut src = source
        .create_copy(&mem, "", &RasterCreationOptions::new())
        .with_context(|| format!("staging {} in memory", input.display()))?;
    src.set_spatial_ref(&src_srs)
        .context("assigning source spatial reference")?;

    let output = output_path(input, &cfg.dest_dir)?;
    let dst = create_target(&src, &src_srs, &dst_srs, &output)?;
    gdal::raster::reproject(&src, &dst)
        .with_context(|| format!("reprojecting {}", input.display()))?;
    drop(dst);

    Ok(output)
}

fn spatial_ref(definition: &str) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_definition(definition)
        .with_context(|| format!("parsing CRS {definition}"))?;
    // x/y must mean easting/northing on both sides regardless of what the
    // authority says about axis order.
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Destination dataset sized like the source, georeferenced to the
/// transformed source bounds.
fn create_target(
    src: &Dataset,
    src_srs: &SpatialRef,
    dst_srs: &SpatialRef,
    output: &Path,
) -> Result<Dataset> {
    let (width, height) = src.raster_size();
    let gt = src
        .geo_transform()
        .context("input raster has no geotransform")?;
    let (min_x, min_y, max_x, max_y) = transformed_bounds(&gt, width, height, src_srs, dst_srs)?;

    let bands = src.raster_count();
    let driver = DriverManager::get_driver_by_name("GTiff").context("loading GTiff driver")?;
    let mut dst = driver
        .create_with_band_type::<f32, _>(output, width, height, bands)
        .with_context(|| format!("creating {}", output.display()))?;
    dst.set_spatial_ref(dst_srs)
        .context("assigning destination spatial reference")?;
    dst.set_geo_transform(&[
        min_x,
        (max_x - min_x) / width as f64,
        0.0,
        max_y,
        0.0,
        -(max_y - min_y) / height as f64,
    ])
    .context("assigning destination geotransform")?;

    for band in 1..=bands {
        if let Some(no_data) = src.rasterband(band)?.no_data_value() {
            dst.rasterband(band)?.set_no_data_value(Some(no_data))?;
        }
    }

    Ok(dst)
}

/// Source bounds pushed through the CRS transform, sampled along the raster
/// boundary rather than corners only.
fn transformed_bounds(
    gt: &[f64; 6],
    width: usize,
    height: usize,
    src_srs: &SpatialRef,
    dst_srs: &SpatialRef,
) -> Result<(f64, f64, f64, f64)> {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for i in 0..=EDGE_SAMPLES {
        for j in 0..=EDGE_SAMPLES {
            if i != 0 && i != EDGE_SAMPLES && j != 0 && j != EDGE_SAMPLES {
                continue;
            }
            let px = width as f64 * i as f64 / EDGE_SAMPLES as f64;
            let py = height as f64 * j as f64 / EDGE_SAMPLES as f64;
            xs.push(gt[0] + px * gt[1] + py * gt[2]);
            ys.push(gt[3] + px * gt[4] + py * gt[5]);
        }
    }

    let transform =
        CoordTransform::new(src_srs, dst_srs).context("building coordinate transform")?;
    let mut zs = vec![0.0; xs.len()];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .context("transforming raster bounds")?;

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    anyhow::ensure!(
        min_x.is_finite() && max_x > min_x && max_y > min_y,
        "raster bounds do not transform to a finite extent"
    );
    Ok((min_x, min_y, max_x, max_y))
}

fn subdataset_entries(ds: &Dataset) -> Vec<String> {
    ds.metadata_domain("SUBDATASETS").unwrap_or_default()
}

/// Pick the subdataset holding `variable` from SUBDATASETS metadata entries
/// of the form `SUBDATASET_1_NAME=NETCDF:"file.nc":tasmax`.
fn subdataset_for(entries: &[String], variable: &str) -> Option<String> {
    let suffix = format!(":{variable}");
    for entry in entries {
        if let Some((key, value)) = entry.split_once('=') {
            if key.ends_with("_NAME") && value.ends_with(&suffix) {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// `<dest>/<input stem>.tif`
pub(crate) fn output_path(input: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("unusable file name: {}", input.display()))?;
    Ok(dest_dir.join(format!("{stem}.tif")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_swaps_extension_and_directory() {
        let out = output_path(Path::new("/data/in/tasmax_day_20200101.nc"), Path::new("/data/out"))
            .unwrap();
        assert_eq!(out, Path::new("/data/out/tasmax_day_20200101.tif"));
    }

    #[test]
    fn output_flattens_nested_inputs() {
        let out = output_path(Path::new("/data/in/2020/jan/t.nc"), Path::new("/out")).unwrap();
        assert_eq!(out, Path::new("/out/t.tif"));
    }

    #[test]
    fn subdataset_matches_exact_variable() {
        let entries = vec![
            "SUBDATASET_1_NAME=NETCDF:\"/d/f.nc\":tas".to_string(),
            "SUBDATASET_1_DESC=[1x606x484] tas".to_string(),
            "SUBDATASET_2_NAME=NETCDF:\"/d/f.nc\":tasmax".to_string(),
            "SUBDATASET_2_DESC=[1x606x484] tasmax".to_string(),
        ];
        assert_eq!(
            subdataset_for(&entries, "tasmax").as_deref(),
            Some("NETCDF:\"/d/f.nc\":tasmax")
        );
        // "tas" must not match the "tasmax" entry
        assert_eq!(
            subdataset_for(&entries, "tas").as_deref(),
            Some("NETCDF:\"/d/f.nc\":tas")
        );
        assert_eq!(subdataset_for(&entries, "pr"), None);
    }

    #[test]
    fn no_subdatasets_means_plain_raster() {
        assert_eq!(subdataset_for(&[], "tasmax"), None);
    }
}
