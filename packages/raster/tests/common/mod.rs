#![allow(dead_code)]

use raster::{Coverage, Envelope, GeoKeys, GeoTransform, RasterData};

/// GeoKey directory for EPSG:4326, geographic lat/lon.
pub fn wgs84_keys() -> GeoKeys {
    GeoKeys {
        directory: vec![
            1, 1, 0, 3, // header: version 1.1.0, 3 keys
            1024, 0, 1, 2, // GTModelType = Geographic
            1025, 0, 1, 1, // GTRasterType = PixelIsArea
            2048, 0, 1, 4326, // GeographicType = WGS 84
        ],
        doubles: None,
        ascii: Some("WGS 84|".to_string()),
    }
}

/// One-degree global grid, 360x180, sample = (row + col) mod 256.
pub fn world() -> Coverage {
    let extent = Envelope::new(-180.0, -90.0, 180.0, 90.0);
    let data = (0..180u32)
        .flat_map(|row| (0..360u32).map(move |col| ((row + col) % 256) as u8))
        .collect();

    Coverage::new(
        360,
        180,
        1,
        RasterData::U8(data),
        GeoTransform::covering(&extent, 360, 180),
    )
    .unwrap()
    .with_geo_keys(wgs84_keys())
}
