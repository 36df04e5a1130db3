use super::page::{PageView, Region};

/// Edges closer than this collapse into one cut; also the minimum height a
/// band must clear to survive.
const EDGE_TOLERANCE: f64 = 0.5;

/// Slice a page into full-width record bands. Every drawn rectangle
/// contributes both edges as cut lines; consecutive cuts frame a candidate
/// band and only bands with visible text survive. Pages with a repeated
/// header are cropped below their first horizontal rule before cutting, so
/// the header never lands in a band. A page with no rectangles yields a
/// single whole-page candidate.
pub fn split_bands(page: &dyn PageView, crop_header: bool) -> Vec<Region> {
    let mut region = page.bounds();
    if crop_header {
        let below_top = page
            .rule_tops()
            .into_iter()
            .find(|t| *t > region.top + EDGE_TOLERANCE && *t < region.bottom);
        if let Some(rule) = below_top {
            region.top = rule;
        }
    }

    let mut cuts = vec![region.top, region.bottom];
    for edge in page.rect_edges() {
        if edge > region.top + EDGE_TOLERANCE && edge < region.bottom - EDGE_TOLERANCE {
            cuts.push(edge);
        }
    }
    cuts.sort_by(|a, b| a.total_cmp(b));
    cuts.dedup_by(|a, b| (*a - *b).abs() <= EDGE_TOLERANCE);

    let mut bands = Vec::new();
    for pair in cuts.windows(2) {
        let band = Region {
            x0: region.x0,
            top: pair[0],
            x1: region.x1,
            bottom: pair[1],
        };
        if band.height() <= EDGE_TOLERANCE {
            continue;
        }
        if !page.text_within(&band).trim().is_empty() {
            bands.push(band);
        }
    }
    bands
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scripted page: words live at fixed origins, geometry is declared.
    pub(crate) struct FakePage {
        bounds: Region,
        edges: Vec<f64>,
        rules: Vec<f64>,
        words: Vec<(f64, f64, String)>,
    }

    impl FakePage {
        pub(crate) fn letter() -> FakePage {
            FakePage {
                bounds: Region {
                    x0: 0.0,
                    top: 0.0,
                    x1: 612.0,
                    bottom: 792.0,
                },
                edges: Vec::new(),
                rules: Vec::new(),
                words: Vec::new(),
            }
        }

        pub(crate) fn word(mut self, x: f64, y: f64, text: &str) -> FakePage {
            self.words.push((x, y, text.to_string()));
            self
        }

        pub(crate) fn edge(mut self, y: f64) -> FakePage {
            self.edges.push(y);
            self
        }

        pub(crate) fn rule(mut self, y: f64) -> FakePage {
            self.rules.push(y);
            self
        }
    }

    impl PageView for FakePage {
        fn bounds(&self) -> Region {
            self.bounds
        }

        fn rect_edges(&self) -> Vec<f64> {
            self.edges.clone()
        }

        fn rule_tops(&self) -> Vec<f64> {
            let mut tops = self.rules.clone();
            tops.sort_by(|a, b| a.total_cmp(b));
            tops
        }

        fn text_within(&self, region: &Region) -> String {
            let mut hits: Vec<&(f64, f64, String)> = self
                .words
                .iter()
                .filter(|(x, y, _)| region.contains(*x, *y))
                .collect();
            hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));
            let mut lines: Vec<String> = Vec::new();
            let mut last_y = f64::NEG_INFINITY;
            for (_, y, text) in hits {
                if (y - last_y).abs() > 0.01 {
                    lines.push(text.clone());
                    last_y = *y;
                } else {
                    let line = lines.last_mut().unwrap();
                    line.push(' ');
                    line.push_str(text);
                }
            }
            lines.join("\n")
        }
    }

    #[test]
    fn no_rects_yields_whole_page() {
        let page = FakePage::letter().word(10.0, 100.0, "ROW");
        let bands = split_bands(&page, false);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0], page.bounds());
    }

    #[test]
    fn empty_page_yields_nothing() {
        let page = FakePage::letter();
        assert!(split_bands(&page, false).is_empty());
    }

    #[test]
    fn edges_cut_and_blank_bands_drop() {
        let page = FakePage::letter()
            .edge(100.0)
            .edge(200.0)
            .word(10.0, 50.0, "FIRST")
            .word(10.0, 150.0, "SECOND");
        let bands = split_bands(&page, false);
        assert_eq!(bands.len(), 2, "the textless band below 200 is dropped");
        assert_eq!((bands[0].top, bands[0].bottom), (0.0, 100.0));
        assert_eq!((bands[1].top, bands[1].bottom), (100.0, 200.0));
    }

    #[test]
    fn coincident_edges_collapse() {
        let page = FakePage::letter()
            .edge(100.0)
            .edge(100.3)
            .word(10.0, 50.0, "A")
            .word(10.0, 150.0, "B");
        let bands = split_bands(&page, false);
        assert_eq!(bands.len(), 2);
    }

    #[test]
    fn header_crop_removes_everything_above_first_rule() {
        let page = FakePage::letter()
            .rule(40.0)
            .word(10.0, 20.0, "LOBBYIST REGISTRATIONS")
            .word(10.0, 100.0, "ROW");
        let bands = split_bands(&page, true);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].top, 40.0);
        assert_eq!(page.text_within(&bands[0]), "ROW");

        let uncropped = split_bands(&page, false);
        assert!(page.text_within(&uncropped[0]).contains("LOBBYIST"));
    }
}
