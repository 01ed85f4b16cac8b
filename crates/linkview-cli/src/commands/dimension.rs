use linkview_store::Catalog;
use serde::Serialize;

use crate::app::App;
use crate::output::print_json;

#[derive(Serialize)]
struct DimensionOut {
    id: i64,
    name: String,
}

pub fn run_add(app: &App, name: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dim = app.catalog.add_dimension(name)?;
    if json {
        return print_json(&DimensionOut {
            id: dim.id,
            name: dim.name,
        });
    }
    println!("Dimension '{}' (id {})", dim.name, dim.id);
    Ok(())
}

pub fn run_list(app: &App, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dims = app.catalog.dimensions()?;
    if json {
        let out: Vec<DimensionOut> = dims
            .into_iter()
            .map(|d| DimensionOut { id: d.id, name: d.name })
            .collect();
        return print_json(&out);
    }
    if dims.is_empty() {
        println!("No dimensions.");
    }
    for dim in dims {
        println!("{:>4}  {}", dim.id, dim.name);
    }
    Ok(())
}
