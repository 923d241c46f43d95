//! Test helpers: build real xlsx buffers in memory.

use bytes::Bytes;
use rust_xlsxwriter::{Formula, Workbook};

#[derive(Debug, Clone, Copy)]
pub enum Cell {
    Num(f64),
    Text(&'static str),
    Bool(bool),
    /// A formula with its cached result, e.g. `("=1/0", "#DIV/0!")`.
    Formula(&'static str, &'static str),
    Blank,
}

/// One entry per sheet, one slice of cells per row.
pub fn workbook_bytes(sheets: &[&[&[Cell]]]) -> Bytes {
    let mut workbook = Workbook::new();
    for rows in sheets {
        let worksheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match *cell {
                    Cell::Num(n) => {
                        worksheet.write_number(r, c, n).unwrap();
                    }
                    Cell::Text(s) => {
                        worksheet.write_string(r, c, s).unwrap();
                    }
                    Cell::Bool(b) => {
                        worksheet.write_boolean(r, c, b).unwrap();
                    }
                    Cell::Formula(formula, result) => {
                        worksheet
                            .write_formula(r, c, Formula::new(formula).set_result(result))
                            .unwrap();
                    }
                    Cell::Blank => {}
                }
            }
        }
    }
    Bytes::from(workbook.save_to_buffer().unwrap())
}

/// A valid offer row.
pub fn offer(id: f64, name: &'static str, price: f64, quantity: f64, available: &'static str) -> [Cell; 5] {
    [
        Cell::Num(id),
        Cell::Text(name),
        Cell::Num(price),
        Cell::Num(quantity),
        Cell::Text(available),
    ]
}

/// Five rows: four valid, one with a non-numeric price.
pub fn scenario_a() -> Bytes {
    let rows: [[Cell; 5]; 5] = [
        offer(1.0, "Pencil set 8 pcs", 500.0, 9.0, "true"),
        offer(2.0, "Sketchbook A4", 300.0, 4.0, "true"),
        [
            Cell::Num(3.0),
            Cell::Text("Watercolor paints"),
            Cell::Text("expensive"),
            Cell::Num(2.0),
            Cell::Text("true"),
        ],
        offer(4.0, "Eraser", 20.0, 100.0, "true"),
        offer(5.0, "Gift drawing kit", 1800.0, 2.0, "true"),
    ];
    let rows: Vec<&[Cell]> = rows.iter().map(|r| r.as_slice()).collect();
    workbook_bytes(&[&rows])
}
