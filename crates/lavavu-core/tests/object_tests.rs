//! Object data, filter and map integration tests

mod common;

use lavavu_core::palette::presets;
use lavavu_core::{
    CanonicalArray, Colour, DataRole, Dims, Filter, FilterRange, LavaVuError, PropertyValue,
    Renderer, ValidationError,
};
use ndarray::{arr1, arr2};
use serde_json::json;

fn f32s(array: &CanonicalArray) -> Vec<f32> {
    array.as_f32().expect("f32 array").iter().copied().collect()
}

fn u32s(array: &CanonicalArray) -> Vec<u32> {
    array.as_u32().expect("u32 array").iter().copied().collect()
}

// === End-to-end scenarios ===

#[test]
fn test_points_with_values() {
    let lv = common::direct();
    let pts = lv.add("pts", json!({"renderer": "points"})).unwrap();
    pts.vertices(vec![[0.0f32, 1.0], [1.0, 0.0]]).unwrap();
    pts.values(vec![2.0f32, 3.0], Some("v")).unwrap();

    let data = pts.data().unwrap();
    assert_eq!(data.len(), 1);
    let vertices = data[0].copy("vertices").unwrap();
    assert_eq!(
        vertices.as_f32().unwrap(),
        &arr2(&[[0.0f32, 1.0, 0.0], [1.0, 0.0, 0.0]]).into_dyn()
    );
    let values = data[0].copy("v").unwrap();
    assert_eq!(values.as_f32().unwrap(), &arr1(&[2.0f32, 3.0]).into_dyn());
    assert!(pts.get("dims").unwrap().is_null());
}

#[test]
fn test_contour_convert() {
    let lv = common::direct();
    let grid = lv
        .add("grid", json!({"renderer": "grid", "dims": [3, 3]}))
        .unwrap();
    grid.vertices(common::unit_square()).unwrap();
    grid.values(vec![0.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0], Some("v"))
        .unwrap();
    assert_eq!(f32s(&grid.data().unwrap()[0].copy("vertices").unwrap()).len(), 27);

    let converted = grid.contours(&[0.5], false, true).unwrap();
    assert_eq!(converted.name(), "grid");
    assert_eq!(grid.get("renderer").unwrap(), PropertyValue::from("lines"));
    let data = grid.data().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].renderer(), Renderer::Lines);
    assert!(grid.data_of(Some("grid"), "").unwrap().is_empty());
}

#[test]
fn test_contour_to_new_object() {
    let lv = common::direct();
    let grid = lv
        .add("grid", json!({"renderer": "grid", "dims": [3, 3]}))
        .unwrap();
    grid.vertices(common::unit_square()).unwrap();
    grid.values(vec![0.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0], None)
        .unwrap();

    let lines = grid.contours(&[0.5], false, false).unwrap();
    assert_eq!(lines.name(), "grid_contours");
    assert_eq!(lines.data().unwrap()[0].renderer(), Renderer::Lines);
    assert_eq!(grid.get("renderer").unwrap(), PropertyValue::from("grid"));
}

#[test]
fn test_filter_record() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    let index = pts.filter("x", (0.0, 1.0), false, false).unwrap();
    assert_eq!(index, 0);
    let filters = pts.get("filters").unwrap().to_json();
    assert_eq!(
        filters[0],
        json!({
            "by": "x",
            "minimum": 0.0,
            "maximum": 1.0,
            "map": false,
            "out": false,
            "inclusive": false
        })
    );
}

// === Boundary behaviour ===

#[test]
fn test_empty_vertices() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.vertices(Vec::<[f32; 3]>::new()).unwrap();
    let data = pts.data().unwrap();
    let shape = data[0]
        .with_view("vertices", |view| view.shape().to_vec())
        .unwrap();
    assert_eq!(shape, vec![0, 3]);
}

#[test]
fn test_colour_names() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.colours("red green blue").unwrap();
    let stored = u32s(&pts.data().unwrap()[0].copy("colours").unwrap());
    let expected: Vec<u32> = ["red", "green", "blue"]
        .iter()
        .map(|c| Colour::parse(c).unwrap().to_u32())
        .collect();
    assert_eq!(stored, expected);
}

#[test]
fn test_colour_bytes_and_rgb() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.colours(vec![255u8, 0, 0, 255, 0, 0, 255, 128]).unwrap();
    let stored = u32s(&pts.data().unwrap()[0].copy("colours").unwrap());
    assert_eq!(stored, vec![0xff00_00ff, 0x80ff_0000]);

    pts.cleardata("colours").unwrap();
    pts.colours(vec![[1.0f32, 0.0, 0.0]]).unwrap();
    let stored = u32s(&pts.data().unwrap()[0].copy("colours").unwrap());
    assert_eq!(stored, vec![Colour::new(255, 0, 0, 255).to_u32()]);

    assert!(matches!(
        pts.colours(vec![1u8, 2, 3]).unwrap_err(),
        LavaVuError::Validation(ValidationError::InvalidArgument { .. })
    ));
}

#[test]
fn test_index_offset() {
    let lv = common::direct();
    let tris = lv.triangles(Some("tris"), json!({})).unwrap();
    tris.indices(vec![1u32, 2, 3], 1).unwrap();
    assert_eq!(u32s(&tris.data().unwrap()[0].copy("indices").unwrap()), vec![0, 1, 2]);
    assert!(tris.indices(vec![0u32, 1], 1).is_err());
}

#[test]
fn test_cubehelix_stops() {
    let palette = presets::cubehelix(16, 0.5, -1.5, 1.0, 1.0, None);
    let list = palette.to_list();
    assert_eq!(list.len(), 17);
    assert_eq!(list[0].0, 0.0);
    assert_eq!(list[16].0, 1.0);
    assert!(list.windows(2).all(|w| w[0].0 <= w[1].0));
}

// === Data round trips ===

#[test]
fn test_set_adopts_dims() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.vertices(vec![[0.0f32, 0.0, 0.0]; 6]).unwrap();
    let data = pts.data().unwrap();
    let grid = ndarray::Array3::<f32>::zeros((2, 3, 3));
    data[0].set("vertices", grid).unwrap();
    let dims = Dims::from_json(&pts.get("dims").unwrap().to_json()).unwrap();
    assert_eq!(dims, Dims::new(3, 2, 0));
    let shape = data[0].with_view("vertices", |v| v.shape().to_vec()).unwrap();
    assert_eq!(shape, vec![2, 3, 3]);
}

#[test]
fn test_vectors_with_magnitude() {
    let lv = common::direct();
    let arrows = lv.vectors(Some("arrows"), json!({})).unwrap();
    arrows.vertices(vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0]]).unwrap();
    arrows
        .vectors(vec![[3.0f32, 4.0, 0.0], [0.0, 0.0, 2.0]], Some(""))
        .unwrap();
    let data = arrows.data().unwrap();
    assert_eq!(f32s(&data[0].copy("magnitude").unwrap()), vec![5.0, 2.0]);
    let labels: Vec<String> = arrows.datasets().unwrap().into_iter().map(|d| d.label).collect();
    assert_eq!(labels, vec!["magnitude"]);
}

#[test]
fn test_swap_axes() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.vertices(vec![[1.0f32, 2.0, 3.0]]).unwrap();
    pts.swapxy().unwrap();
    assert_eq!(f32s(&pts.data().unwrap()[0].copy("vertices").unwrap()), vec![2.0, 1.0, 3.0]);
    pts.swapyz().unwrap();
    assert_eq!(f32s(&pts.data().unwrap()[0].copy("vertices").unwrap()), vec![2.0, 3.0, 1.0]);
}

#[test]
fn test_cleardata_by_role_and_label() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.vertices(vec![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
    pts.values(vec![1.0f32, 2.0], Some("a")).unwrap();
    pts.values(vec![3.0f32, 4.0], Some("b")).unwrap();

    pts.cleardata("a").unwrap();
    let labels: Vec<String> = pts.datasets().unwrap().into_iter().map(|d| d.label).collect();
    assert_eq!(labels, vec!["b"]);

    pts.cleardata(DataRole::Vertices.as_str()).unwrap();
    assert!(pts.data().unwrap()[0].copy("vertices").unwrap().is_empty());

    pts.clear().unwrap();
    assert!(pts.data().unwrap().is_empty());
}

#[test]
fn test_add_with_data_keys() {
    let lv = common::direct();
    let pts = lv
        .add(
            "pts",
            json!({
                "renderer": "points",
                "vertices": [[0, 0, 0], [1, 1, 1]],
                "values": [0.5, 1.5],
                "colours": "red blue",
            }),
        )
        .unwrap();
    let data = pts.data().unwrap();
    assert_eq!(f32s(&data[0].copy("vertices").unwrap()).len(), 6);
    assert_eq!(f32s(&data[0].copy("default").unwrap()), vec![0.5, 1.5]);
    assert_eq!(u32s(&data[0].copy("colours").unwrap()).len(), 2);
}

// === Filters ===

#[test]
fn test_filter_endpoints() {
    let include = Filter::new("v", FilterRange::Inclusive(1.0, 2.0), false, false, (0.0, 10.0));
    let exclude = Filter::new("v", FilterRange::Inclusive(1.0, 2.0), true, false, (0.0, 10.0));
    assert!(include.passes(1.0, (0.0, 10.0)));
    assert!(!exclude.passes(1.0, (0.0, 10.0)));
}

#[test]
fn test_filter_edits() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.vertices(vec![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
    pts.values(vec![0.0f32, 10.0], Some("v")).unwrap();

    let full = pts.include("v", FilterRange::Full).unwrap();
    let mapped = pts.excludemap("v", [0.25, 0.75]).unwrap();
    let filters = pts.filters().unwrap();
    assert_eq!((filters[full].minimum, filters[full].maximum), (0.0, 10.0));
    assert!(filters[mapped].map && filters[mapped].out && filters[mapped].inclusive);

    pts.update_filter(mapped, [0.5, 1.0]).unwrap();
    assert_eq!(pts.filters().unwrap()[mapped].minimum, 0.5);
    assert!(pts.filters().unwrap()[mapped].out);

    pts.remove_filter(full).unwrap();
    assert_eq!(pts.filters().unwrap().len(), 1);
    assert!(matches!(
        pts.remove_filter(5).unwrap_err(),
        LavaVuError::Validation(ValidationError::InvalidFilterIndex { index: 5, count: 1 })
    ));
}

// === Colour and opacity maps ===

#[test]
fn test_object_colourmap() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    let cm = pts.colourmap("black white").unwrap();
    assert_eq!(cm.name(), "pts_colourmap");
    assert_eq!(pts.get("colourmap").unwrap(), PropertyValue::from("pts_colourmap"));

    // Naming an existing map attaches it
    let shared = lv.colourmap("shared", "red blue").unwrap();
    let attached = pts.colourmap("shared").unwrap();
    assert_eq!(attached.name(), shared.name());
    assert_eq!(pts.get("colourmap").unwrap(), PropertyValue::from("shared"));
    assert!(pts.getcolourmap(false).unwrap().is_some());
}

#[test]
fn test_colourmap_roundtrip_through_list() {
    let lv = common::direct();
    let original = lv.colourmap("a", "#000000 #ff0000 #ffff00 #ffffff").unwrap();
    let copy = lv.colourmap("b", original.tolist().unwrap()).unwrap();
    assert_eq!(copy.tolist().unwrap(), original.tolist().unwrap());
}

#[test]
fn test_foreign_colourmap_conflict() {
    let lv = common::direct();
    let other = common::direct();
    let foreign = other.colourmap("shared", "red blue").unwrap();
    let pts = lv.points(Some("pts"), json!({})).unwrap();

    // Copied in when the name is free
    pts.set_colourmap(&foreign).unwrap();
    assert!(lv.colourmap_names().unwrap().contains(&"shared".to_string()));

    // Then the name is taken
    let err = pts.set_colourmap(&foreign).unwrap_err();
    assert!(matches!(err, LavaVuError::Validation(ValidationError::ColourMapConflict { .. })));
}

#[test]
fn test_opacitymap() {
    let lv = common::direct();
    let vol = lv.volume(Some("vol"), json!({})).unwrap();
    let map = vol.opacitymap(vec![0.0, 1.0]).unwrap();
    assert_eq!(map.name(), "vol_opacitymap");
    assert_eq!(vol.get("opacitymap").unwrap(), PropertyValue::from("vol_opacitymap"));
    let list = map.tolist().unwrap();
    assert_eq!(list[0].1, [0, 0, 0, 0]);
    assert_eq!(list[1].1, [0, 0, 0, 255]);
}

#[test]
fn test_colourbar_follows_object_map() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    pts.colourmap("black white").unwrap();

    let bar = pts.colourbar(json!({"align": "left"})).unwrap();
    assert_eq!(bar.name(), "pts_colourbar");
    assert_eq!(bar.get("colourbar").unwrap(), PropertyValue::from(true));
    assert_eq!(bar.get("colourmap").unwrap(), PropertyValue::from("pts_colourmap"));
    assert_eq!(bar.get("align").unwrap(), PropertyValue::from("left"));
    assert!(lv.object_names().unwrap().contains(&"pts_colourbar".to_string()));
}

#[test]
fn test_colourbar_uses_selection() {
    let lv = common::direct();
    let bar = lv.colourbar(None, json!({})).unwrap();
    assert_eq!(bar.name(), "colourbar");
    assert!(bar.get("colourmap").unwrap().is_null());

    let lines = lv.lines(Some("edges"), json!({})).unwrap();
    lines.colourmap("red blue").unwrap();
    lines.select().unwrap();
    let bar = lv.colourbar(None, json!({})).unwrap();
    assert_eq!(bar.name(), "edges_colourbar");
    assert_eq!(bar.get("colourmap").unwrap(), PropertyValue::from("edges_colourmap"));
}

// === Time steps ===

#[test]
fn test_data_of_time_steps() {
    let lv = common::direct();
    let pts = lv.points(Some("pts"), json!({})).unwrap();
    lv.addstep(Some(0), json!({})).unwrap();
    pts.vertices(vec![[0.0f32, 0.0, 0.0]]).unwrap();
    lv.addstep(Some(1), json!({})).unwrap();
    pts.vertices(vec![[1.0f32, 1.0, 1.0], [2.0, 2.0, 2.0]]).unwrap();

    let first = pts.data_of(None, "0").unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(f32s(&first[0].copy("vertices").unwrap()), vec![0.0; 3]);
    assert_eq!(pts.data_of(None, "1").unwrap().len(), 1);
    assert_eq!(pts.data_of(None, "current").unwrap().len(), 1);
    assert_eq!(pts.data_of(None, "all").unwrap().len(), 2);
    assert!(pts.data_of(None, "-1").unwrap().is_empty());
    assert!(pts.data_of(None, "7").unwrap().is_empty());

    // The default scope follows the current step
    lv.set_timestep(0).unwrap();
    let current = pts.data().unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(f32s(&current[0].copy("vertices").unwrap()).len(), 3);
}
