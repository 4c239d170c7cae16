#![allow(dead_code)]

use chrono::NaiveDate;
use olap_report::extract::MemorySource;
use olap_report::frame::{Column, ColumnType, Frame, Value};

use ColumnType::{Date, Double, Integer, Text};

pub const FACT_ROWS: u64 = 4;

fn frame(name: &str, columns: &[(&str, ColumnType)], rows: Vec<Vec<Value>>) -> Frame {
    let columns = columns
        .iter()
        .map(|(name, column_type)| Column::new(*name, *column_type))
        .collect();
    rows.into_iter()
        .fold(Frame::new(name, columns), |frame, row| {
            frame.with_row(row).expect("fixture row matches its columns")
        })
}

fn int(value: i64) -> Value {
    Value::from(value)
}

fn text(value: &str) -> Value {
    Value::from(value)
}

fn real(value: f64) -> Value {
    Value::from(value)
}

fn date(year: i32, month: u32, day: u32) -> Value {
    Value::from(NaiveDate::from_ymd_opt(year, month, day))
}

pub fn cas() -> Frame {
    frame(
        "Cas",
        &[
            ("idDatum", Integer),
            ("PolniDatum", Date),
            ("DanVTednu", Text),
            ("Teden", Integer),
            ("Mesec", Integer),
            ("Leto", Integer),
        ],
        vec![
            vec![int(1), date(2023, 1, 15), text("Nedelja"), int(2), int(1), int(2023)],
            vec![int(2), date(2023, 2, 10), text("Petek"), int(6), int(2), int(2023)],
            vec![int(3), date(2024, 1, 5), text("Petek"), int(1), int(1), int(2024)],
        ],
    )
}

/// The eight source tables of the dwpikp schema with a handful of rows each.
///
/// Fact rows: customer 1 buys twice with a discount, customer 2 once without, customer 3 once
/// without and has a socioeconomic key with no matching profile.
pub fn dwpikp_frames() -> Vec<Frame> {
    vec![
        cas(),
        frame(
            "Izdelek",
            &[
                ("idIzdelek", Integer),
                ("Koda", Text),
                ("NazivIzdelka", Text),
                ("Kategorija", Text),
                ("Cena", Double),
            ],
            vec![
                vec![int(1), text("P-001"), text("Slusalke"), text("Elektronika"), real(49.9)],
                vec![int(2), text("P-002"), text("Majica"), text("Oblacila"), real(19.5)],
            ],
        ),
        frame(
            "Kupec",
            &[
                ("idKupec", Integer),
                ("novAliVracajoc", Text),
                ("steviloTransakcij", Integer),
            ],
            vec![
                vec![int(1), text("Vracajoc"), int(2)],
                vec![int(2), text("Nov"), int(1)],
                vec![int(3), text("Nov"), int(1)],
            ],
        ),
        frame(
            "Lokacija",
            &[("idLokacija", Integer), ("Drzava", Text), ("Mesto", Text)],
            vec![
                vec![int(1), text("Slovenija"), text("Ljubljana")],
                vec![int(2), text("Slovenija"), text("Maribor")],
            ],
        ),
        frame(
            "Popust",
            &[("idPopust", Integer), ("popustUporabljen", Text)],
            vec![vec![int(1), text("Yes")], vec![int(2), text("No")]],
        ),
        frame(
            "SocioekonomskiProfil",
            &[
                ("idSocioekonomskiProfil", Integer),
                ("izobrazbenaRaven", Text),
                ("zaposlitveniStatus", Text),
            ],
            vec![
                vec![int(1), text("Srednja"), text("Zaposlen")],
                vec![int(2), text("Visoka"), text("Samozaposlen")],
            ],
        ),
        frame(
            "Demografija",
            &[("idDemografija", Integer), ("spol", Text), ("starostnaSkupina", Text)],
            vec![
                vec![int(1), text("Z"), text("25-34")],
                vec![int(2), text("M"), text("35-44")],
            ],
        ),
        frame(
            "tabela_dejstev",
            &[
                ("id", Integer),
                ("tk_id_datum", Integer),
                ("tk_id_lokacija", Integer),
                ("tk_id_kupec", Integer),
                ("tk_id_izdelek", Integer),
                ("tk_id_popust", Integer),
                ("tk_id_socioekonomski_profil", Integer),
                ("tk_id_demografija", Integer),
                ("kolicinaIzdelkov", Integer),
                ("skupniPrihodek", Double),
                ("povprecnoPorabljenoNaTransakcijo", Double),
                ("PoglediPredNakupom", Integer),
                ("znesekPopusta", Double),
                ("obiskiNaUporabnika", Integer),
                ("steviloTransakcijPoClanstvu", Integer),
                ("steviloKupcevPoDemografiji", Integer),
                ("stopnjaVracil", Double),
            ],
            vec![
                fact(1, 1, 1, 1, 1, 1, 1, 100.0, 50.0, 4),
                fact(2, 1, 2, 2, 2, 2, 2, 40.0, 40.0, 2),
                fact(3, 2, 1, 1, 1, 1, 1, 90.0, 30.0, 4),
                fact(4, 3, 3, 1, 2, 3, 1, 20.0, 20.0, 0),
            ],
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn fact(
    id: i64,
    datum: i64,
    kupec: i64,
    izdelek: i64,
    popust: i64,
    profil: i64,
    demografija: i64,
    prihodek: f64,
    povprecje: f64,
    obiski: i64,
) -> Vec<Value> {
    vec![
        int(id),
        int(datum),
        int(1 + id % 2),
        int(kupec),
        int(izdelek),
        int(popust),
        int(profil),
        int(demografija),
        int(1),
        real(prihodek),
        real(povprecje),
        int(3),
        real(0.0),
        int(obiski),
        int(1),
        int(1),
        real(0.0),
    ]
}

pub fn memory_source() -> MemorySource {
    dwpikp_frames().into_iter().collect()
}
